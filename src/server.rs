//! Listening socket, accept loop, and session bookkeeping (spec.md §4,
//! §6.7). Orderly-shutdown and stored-`JoinHandle` bookkeeping are
//! grounded on `rvoip-registrar-core/src/registrar/manager.rs`'s
//! `tokio::spawn` + running-flag pattern.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex as SyncMutex;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SharedConfig;
use crate::device::{Device, RegistrationState};
use crate::host::Host;
use crate::registry::DeviceRegistry;
use crate::session::Session;

/// Backlog passed to `listen(2)`, matched to the original driver's
/// default (spec.md §6.7).
const LISTEN_BACKLOG: u32 = 50;

/// Port the protocol always binds to; only the address is configurable.
const SCCP_PORT: u16 = 2000;

pub struct Server {
    registry: Arc<DeviceRegistry>,
    config: Mutex<SharedConfig>,
    host: Arc<dyn Host>,
    running: Arc<AtomicBool>,
    sessions: SyncMutex<Vec<(Arc<AtomicBool>, JoinHandle<()>)>>,
}

impl Server {
    pub fn new(config: SharedConfig, host: Arc<dyn Host>) -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new()),
            config: Mutex::new(config),
            host,
            running: Arc::new(AtomicBool::new(true)),
            sessions: SyncMutex::new(Vec::new()),
        }
    }

    /// Bind and accept connections until `shutdown` is called. One task
    /// per connection; connections are never multiplexed onto a shared
    /// task (spec.md §2 "single-threaded cooperative task execution per
    /// session").
    pub async fn run(self: &Arc<Self>) -> std::io::Result<()> {
        let bindaddr = self.config.lock().await.bindaddr.clone();
        let addr: SocketAddr = format!("{bindaddr}:{SCCP_PORT}").parse().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid bindaddr {bindaddr}: {e}"))
        })?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, backlog = LISTEN_BACKLOG, "sccp server listening");

        while self.running.load(Ordering::Relaxed) {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed, continuing");
                    continue;
                }
            };
            self.spawn_session(stream, peer_addr).await;
            self.reap_finished_sessions();
        }
        Ok(())
    }

    async fn spawn_session(self: &Arc<Self>, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let config = self.config.lock().await.clone();
        let session = Session::new(peer_addr, self.registry.clone(), config, self.host.clone());
        let stop = session.stop_handle();
        info!(%peer_addr, "accepted connection");
        let handle = tokio::spawn(async move {
            session.run(stream).await;
        });
        self.sessions.lock().push((stop, handle));
    }

    fn reap_finished_sessions(&self) {
        self.sessions.lock().retain(|(_, handle)| !handle.is_finished());
    }

    /// Signal every session to stop after its current iteration and
    /// wait for them to exit (spec.md §6.7).
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        let handles: Vec<_> = {
            let mut sessions = self.sessions.lock();
            sessions.iter().for_each(|(stop, _)| stop.store(true, Ordering::Relaxed));
            std::mem::take(&mut *sessions)
        };
        for (_, handle) in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "session task panicked during shutdown");
            }
        }
    }

    /// Point-in-time view of every registered device, for a
    /// collaborator CLI or admin surface (spec.md §6.7).
    pub fn device_snapshots(&self) -> Vec<Arc<Device>> {
        self.registry.snapshot()
    }

    /// Force one device back to its pre-registration state, as if its
    /// session had dropped. Used by a collaborator CLI's "reset
    /// device" command.
    pub fn reset_device(&self, name: &str) -> bool {
        match self.registry.get(name) {
            Some(device) => {
                device.mark_connlost();
                self.registry.remove(name);
                true
            }
            None => false,
        }
    }

    /// Swap in a freshly loaded configuration snapshot. Devices that
    /// differ in a way that can't be reconciled live are sent a soft
    /// `RESET` through their own session via `Device::notify`, which
    /// then re-registers on its own (spec.md §4.5, §6.6).
    pub async fn reload_config(&self, new_config: SharedConfig) -> Vec<String> {
        let mut needing_reset = Vec::new();
        for device in self.registry.snapshot() {
            if device.state() == RegistrationState::ConnLost {
                continue;
            }
            if let Some(cfg) = new_config.device(&device.name) {
                if device.apply_config_reload(Arc::new(cfg.clone())).await {
                    device.notify(crate::device::HostEvent::ConfigReset { hard: false }).await;
                    needing_reset.push(device.name.clone());
                }
            }
        }
        *self.config.lock().await = new_config;
        needing_reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSnapshot;
    use async_trait::async_trait;

    struct NullHost;

    #[async_trait]
    impl crate::host::PbxLookup for NullHost {
        async fn exten_exists(&self, _c: &str, _e: &str) -> bool { false }
        async fn matchmore(&self, _c: &str, _e: &str) -> bool { false }
        async fn pbx_start(&self, _c: crate::host::ChannelHandle) {}
    }
    #[async_trait]
    impl crate::host::ChannelHost for NullHost {
        async fn channel_alloc(&self, _l: &str) -> Option<crate::host::ChannelHandle> { None }
        async fn channel_hangup(&self, _c: crate::host::ChannelHandle) {}
        async fn channel_set_state(&self, _c: crate::host::ChannelHandle, _s: crate::host::ChannelState) {}
        async fn channel_send_digit(&self, _c: crate::host::ChannelHandle, _d: char) {}
    }
    #[async_trait]
    impl crate::host::RtpHost for NullHost {
        async fn rtp_new(&self, _a: std::net::SocketAddr) -> Option<crate::host::RtpHandle> { None }
        async fn rtp_set_remote(&self, _i: crate::host::RtpHandle, _a: std::net::SocketAddr) {}
        async fn rtp_local_addr(&self, _i: crate::host::RtpHandle) -> Option<std::net::SocketAddr> { None }
        async fn rtp_destroy(&self, _i: crate::host::RtpHandle) {}
    }
    #[async_trait]
    impl crate::host::HintProvider for NullHost {
        async fn hint_subscribe(&self, _c: &str, _e: &str) -> Option<u64> { None }
        async fn hint_unsubscribe(&self, _id: u64) {}
        async fn hint_query(&self, _c: &str, _e: &str) -> crate::host::BlfState { crate::host::BlfState::Unknown }
    }
    #[async_trait]
    impl crate::host::MwiProvider for NullHost {
        async fn mwi_subscribe(&self, _m: &str, _c: &str) -> Option<u64> { None }
        async fn mwi_unsubscribe(&self, _id: u64) {}
        async fn mwi_query(&self, _m: &str) -> (u32, u32) { (0, 0) }
    }

    #[tokio::test]
    async fn empty_registry_has_no_snapshots() {
        let server = Server::new(Arc::new(ConfigSnapshot::default()), Arc::new(NullHost));
        assert!(server.device_snapshots().is_empty());
    }

    #[tokio::test]
    async fn reset_of_unknown_device_returns_false() {
        let server = Server::new(Arc::new(ConfigSnapshot::default()), Arc::new(NullHost));
        assert!(!server.reset_device("SEPNOBODY"));
    }

    #[tokio::test]
    async fn shutdown_with_no_sessions_returns_immediately() {
        let server = Server::new(Arc::new(ConfigSnapshot::default()), Arc::new(NullHost));
        server.shutdown().await;
    }
}
