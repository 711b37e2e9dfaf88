//! Fakes shared across the integration tests in this directory.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sccp_core::host::{BlfState, ChannelHandle, ChannelState, Host};

/// A host stand-in that answers every dialplan lookup for a single
/// configured (context, extension) pair and otherwise stays inert.
pub struct FakeHost {
    pub context: String,
    pub extension: String,
    next_handle: AtomicU64,
    pub hung_up: Mutex<Vec<ChannelHandle>>,
    pub started: Mutex<Vec<ChannelHandle>>,
}

impl FakeHost {
    pub fn new(context: &str, extension: &str) -> Self {
        Self {
            context: context.to_string(),
            extension: extension.to_string(),
            next_handle: AtomicU64::new(1),
            hung_up: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl sccp_core::host::PbxLookup for FakeHost {
    async fn exten_exists(&self, context: &str, exten: &str) -> bool {
        context == self.context && exten == self.extension
    }
    async fn matchmore(&self, _context: &str, _exten: &str) -> bool {
        false
    }
    async fn pbx_start(&self, channel: ChannelHandle) {
        self.started.lock().unwrap().push(channel);
    }
}

#[async_trait]
impl sccp_core::host::ChannelHost for FakeHost {
    async fn channel_alloc(&self, _line_name: &str) -> Option<ChannelHandle> {
        Some(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
    async fn channel_hangup(&self, channel: ChannelHandle) {
        self.hung_up.lock().unwrap().push(channel);
    }
    async fn channel_set_state(&self, _channel: ChannelHandle, _state: ChannelState) {}
    async fn channel_send_digit(&self, _channel: ChannelHandle, _digit: char) {}
}

#[async_trait]
impl sccp_core::host::RtpHost for FakeHost {
    async fn rtp_new(&self, _local_bind: SocketAddr) -> Option<sccp_core::host::RtpHandle> {
        Some(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
    async fn rtp_set_remote(&self, _instance: sccp_core::host::RtpHandle, _addr: SocketAddr) {}
    async fn rtp_local_addr(&self, _instance: sccp_core::host::RtpHandle) -> Option<SocketAddr> {
        Some("127.0.0.1:16384".parse().unwrap())
    }
    async fn rtp_destroy(&self, _instance: sccp_core::host::RtpHandle) {}
}

#[async_trait]
impl sccp_core::host::HintProvider for FakeHost {
    async fn hint_subscribe(&self, _context: &str, _exten: &str) -> Option<u64> {
        None
    }
    async fn hint_unsubscribe(&self, _id: u64) {}
    async fn hint_query(&self, _context: &str, _exten: &str) -> BlfState {
        BlfState::Unknown
    }
}

#[async_trait]
impl sccp_core::host::MwiProvider for FakeHost {
    async fn mwi_subscribe(&self, _mailbox: &str, _context: &str) -> Option<u64> {
        None
    }
    async fn mwi_unsubscribe(&self, _id: u64) {}
    async fn mwi_query(&self, _mailbox: &str) -> (u32, u32) {
        (0, 0)
    }
}

pub fn test_config(device_name: &str, keepalive: u16, authtimeout: u64) -> sccp_core::ConfigSnapshot {
    sccp_core::ConfigSnapshot {
        bindaddr: "127.0.0.1".into(),
        devices: vec![sccp_core::config::DeviceConfig {
            name: device_name.into(),
            dateformat: "D.M.Y".into(),
            voicemail: "100".into(),
            keepalive,
            authtimeout,
            line: sccp_core::config::LineConfig {
                name: "100".into(),
                cid_name: "Test".into(),
                cid_num: "100".into(),
                context: "default".into(),
                language: "en".into(),
            },
            speeddials: vec![],
            codec_preference: vec![4],
        }],
    }
}
