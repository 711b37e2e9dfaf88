//! Contracts to the telephony host (spec.md §6.2/§6.3). The host is an
//! external collaborator — a real softswitch provides dialplan lookup,
//! channel allocation, RTP endpoints, extension-state hints, and MWI.
//! This module only fixes the Rust shape of those contracts so the
//! session/device layer can be built and tested against fakes.
//!
//! `async_trait` usage mirrors the transport-trait pattern used
//! throughout `eisenzopf-rvoip` (e.g. `rvoip-sip-transport`'s
//! `Transport` trait).

use std::net::SocketAddr;

use async_trait::async_trait;

/// Opaque handle to a host-owned channel object bridging a subchannel
/// to the PBX core.
pub type ChannelHandle = u64;

/// Opaque handle to a host-owned RTP instance.
pub type RtpHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Down,
    Ringing,
    Up,
    Busy,
    Congestion,
}

/// Dialplan lookup, used by the cooperative dialplan-polling task
/// (spec.md §4.5).
#[async_trait]
pub trait PbxLookup: Send + Sync {
    async fn exten_exists(&self, context: &str, exten: &str) -> bool;
    async fn matchmore(&self, context: &str, exten: &str) -> bool;
    /// Begin dialplan execution for an originated call.
    async fn pbx_start(&self, channel: ChannelHandle);
}

/// Host-channel allocation/control (spec.md §6.2, §6.3).
#[async_trait]
pub trait ChannelHost: Send + Sync {
    async fn channel_alloc(&self, line_name: &str) -> Option<ChannelHandle>;
    async fn channel_hangup(&self, channel: ChannelHandle);
    async fn channel_set_state(&self, channel: ChannelHandle, state: ChannelState);
    /// In-band DTMF digit, queued onto the host channel.
    async fn channel_send_digit(&self, channel: ChannelHandle, digit: char);
}

/// RTP endpoint lifecycle (spec.md §6.2).
#[async_trait]
pub trait RtpHost: Send + Sync {
    async fn rtp_new(&self, local_bind: SocketAddr) -> Option<RtpHandle>;
    async fn rtp_set_remote(&self, instance: RtpHandle, addr: SocketAddr);
    async fn rtp_local_addr(&self, instance: RtpHandle) -> Option<SocketAddr>;
    async fn rtp_destroy(&self, instance: RtpHandle);
}

/// Extension-state (BLF) hint subscriptions (spec.md §6.2).
#[async_trait]
pub trait HintProvider: Send + Sync {
    async fn hint_subscribe(&self, context: &str, exten: &str) -> Option<u64>;
    async fn hint_unsubscribe(&self, id: u64);
    async fn hint_query(&self, context: &str, exten: &str) -> BlfState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlfState {
    Unknown,
    Idle,
    InUse,
    Dnd,
    Alerting,
}

/// Message-waiting-indication subscriptions (spec.md §6.2).
#[async_trait]
pub trait MwiProvider: Send + Sync {
    async fn mwi_subscribe(&self, mailbox: &str, context: &str) -> Option<u64>;
    async fn mwi_unsubscribe(&self, id: u64);
    async fn mwi_query(&self, mailbox: &str) -> (u32, u32);
}

/// Everything the device/session layer needs from the host, bundled
/// for convenient injection.
pub trait Host: PbxLookup + ChannelHost + RtpHost + HintProvider + MwiProvider {}
impl<T: PbxLookup + ChannelHost + RtpHost + HintProvider + MwiProvider> Host for T {}
