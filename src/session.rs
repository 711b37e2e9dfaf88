//! Per-connection session: framing, registration gate, the task
//! runner's poll-with-timeout loop, and dispatch into the bound
//! device's state machine (spec.md §4, §5).
//!
//! The read loop, write-half-under-a-lock, and spawned-task shape are
//! grounded on `rvoip-sip-transport/src/transport/udp/mod.rs`'s
//! `Arc<Inner>` + stop-flag + `mpsc` event-channel pattern, adapted
//! from UDP packet reassembly to a framed TCP stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{read_frame, write_frame, Frame};
use crate::config::SharedConfig;
use crate::device::{Device, HostEvent, RegistrationState, SessionAction};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::message::Message;
use crate::registry::{AddOutcome, DeviceRegistry};
use crate::task::{TaskKind, TaskRunner};

pub struct Session {
    peer_addr: SocketAddr,
    registry: Arc<DeviceRegistry>,
    config: SharedConfig,
    host: Arc<dyn Host>,
    device: Option<Arc<Device>>,
    tasks: TaskRunner,
    stop: Arc<AtomicBool>,
}

impl Session {
    pub fn new(peer_addr: SocketAddr, registry: Arc<DeviceRegistry>, config: SharedConfig, host: Arc<dyn Host>) -> Self {
        let mut tasks = TaskRunner::new();
        // The specific device's own `authtimeout` isn't known until
        // REGISTER names it (spec.md §4.4); arm the pre-registration
        // timer against the most conservative configured value instead.
        tasks.add(TaskKind::AuthTimeout, config.pending_auth_timeout_secs());
        Self { peer_addr, registry, config, host, device: None, tasks, stop: Arc::new(AtomicBool::new(false)) }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Drive one connection end to end: accept frames, service timers,
    /// dispatch to the device, and tear down cleanly on exit.
    ///
    /// Framing reads happen on a dedicated spawned task that feeds
    /// decoded frames to the main loop over an `mpsc` channel, rather
    /// than racing `read_frame` directly inside `select!` — `read_frame`
    /// issues two sequential `read_exact` calls and isn't safe to
    /// cancel mid-header without desyncing the stream.
    pub async fn run(mut self, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %self.peer_addr, error = %e, "failed to set TCP_NODELAY");
        }
        let (mut reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(writer));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<HostEvent>();
        let (frames_tx, mut frames_rx) = mpsc::channel::<Result<Frame>>(8);

        let reader_task = tokio::spawn(async move {
            loop {
                let frame = read_frame(&mut reader).await;
                let done = frame.is_err();
                if frames_tx.send(frame).await.is_err() || done {
                    break;
                }
            }
        });

        let result = self.drive(&mut frames_rx, writer, &mut events_rx, events_tx).await;
        if let Err(e) = &result {
            debug!(peer = %self.peer_addr, error = %e, "session ended");
        }
        reader_task.abort();
        self.teardown().await;
    }

    async fn drive<W: AsyncWrite + Unpin>(
        &mut self,
        frames_rx: &mut mpsc::Receiver<Result<Frame>>,
        writer: Arc<Mutex<W>>,
        events_rx: &mut mpsc::UnboundedReceiver<HostEvent>,
        events_tx: mpsc::UnboundedSender<HostEvent>,
    ) -> Result<()> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            let wait_ms = self.tasks.next_ms();
            let sleep = match wait_ms {
                -1 => Duration::from_secs(3600),
                ms => Duration::from_millis(ms.max(0) as u64),
            };

            tokio::select! {
                frame = frames_rx.recv() => {
                    let frame = frame.ok_or(Error::PeerClosed)??;
                    self.tasks.add(TaskKind::KeepaliveTimeout, self.keepalive_secs() * 2);
                    let msg = Message::decode(frame.id, &frame.body)?;
                    self.dispatch_inbound(msg, &writer, &events_tx).await?;
                }
                _ = tokio::time::sleep(sleep) => {
                    self.service_due_tasks(&writer).await?;
                }
                Some(event) = events_rx.recv() => {
                    self.dispatch_host_event(event, &writer).await?;
                }
            }
        }
    }

    fn keepalive_secs(&self) -> u64 {
        self.device.as_ref().and_then(|d| {
            // Keepalive interval is part of the device's own config,
            // looked up once at registration time and not expected to
            // change for the life of the connection.
            self.config.device(&d.name).map(|c| c.keepalive as u64)
        }).unwrap_or(60)
    }

    async fn service_due_tasks<W: AsyncWrite + Unpin>(&mut self, writer: &Arc<Mutex<W>>) -> Result<()> {
        for kind in self.tasks.due() {
            match kind {
                TaskKind::AuthTimeout => {
                    if self.device.is_none() {
                        return Err(Error::Timeout("registration"));
                    }
                }
                TaskKind::KeepaliveTimeout => {
                    return Err(Error::Timeout("keepalive"));
                }
                TaskKind::DialplanPoll { line_instance } => {
                    self.poll_dialplan(line_instance, writer).await?;
                }
            }
        }
        Ok(())
    }

    /// Cooperative poll: rather than blocking the session on a sleep,
    /// reschedule the same task 500ms out when there's nothing
    /// conclusive yet (spec.md §4.5 "Dialplan lookup").
    async fn poll_dialplan<W: AsyncWrite + Unpin>(&mut self, line_instance: u32, writer: &Arc<Mutex<W>>) -> Result<()> {
        let Some(device) = self.device.clone() else { return Ok(()) };
        let (outcome, keep_polling) = device.poll_dialplan(self.host.as_ref()).await;
        self.apply_outcome(outcome, line_instance, writer).await?;
        if keep_polling {
            self.tasks.add_ms(TaskKind::DialplanPoll { line_instance }, 500);
        }
        Ok(())
    }

    async fn dispatch_inbound<W: AsyncWrite + Unpin>(
        &mut self,
        msg: Message,
        writer: &Arc<Mutex<W>>,
        events_tx: &mpsc::UnboundedSender<HostEvent>,
    ) -> Result<()> {
        if self.device.is_none() && !matches!(msg, Message::Register { .. } | Message::Alarm { .. }) {
            return Err(Error::MessageOutOfOrder("non-registration message before REGISTER"));
        }

        match msg {
            Message::KeepAlive => self.send(writer, Message::KeepAliveAck).await,
            Message::Alarm { message } => {
                warn!(peer = %self.peer_addr, %message, "phone alarm");
                Ok(())
            }
            Message::Register { name, device_type, proto_version, .. } => {
                self.handle_register(name, device_type, proto_version, writer, events_tx).await
            }
            Message::Unregister => Err(Error::PeerClosed),
            Message::ButtonTemplateReq => {
                let device = self.device.clone().unwrap();
                let reply = device.handle_button_template_req().await;
                self.send(writer, reply).await
            }
            Message::LineStatusReq { line_instance } => {
                let device = self.device.clone().unwrap();
                let reply = device.handle_line_status_req(line_instance).await?;
                self.send(writer, reply).await
            }
            Message::SpeedDialStatReq { index } => {
                let device = self.device.clone().unwrap();
                let reply = device.handle_speeddial_stat_req(index).await?;
                self.send(writer, reply).await
            }
            Message::OffHook { line_instance, .. } => {
                let device = self.device.clone().unwrap();
                let outcome = device.handle_offhook(self.host.as_ref()).await;
                self.apply_outcome(outcome, line_instance, writer).await
            }
            Message::OnHook { line_instance, .. } => {
                let device = self.device.clone().unwrap();
                let outcome = device.handle_onhook(self.host.as_ref()).await;
                self.apply_outcome(outcome, line_instance, writer).await
            }
            Message::KeypadButton { line_instance, button, .. } => {
                let device = self.device.clone().unwrap();
                let line = device.line_instance().await;
                let outcome = if line == line_instance {
                    device.handle_keypad_offhook(button).await
                } else {
                    Default::default()
                };
                self.send_all(writer, outcome.messages).await?;
                let outcome = device.handle_keypad_connected(button, self.host.as_ref()).await;
                self.send_all(writer, outcome.messages).await
            }
            Message::OpenReceiveChannelAck { ip, port, pass_thru_party_id, .. } => {
                let device = self.device.clone().unwrap();
                let outcome = device.handle_open_receive_channel_ack(self.host.as_ref(), ip, port, pass_thru_party_id).await;
                self.send_all(writer, outcome.messages).await
            }
            Message::SoftKeyEvent { event, line_instance, .. } => {
                let device = self.device.clone().unwrap();
                let outcome = device.handle_softkey_event(event, self.host.as_ref()).await;
                self.apply_outcome(outcome, line_instance, writer).await
            }
            Message::ConfigStatusReq | Message::TimeDateReq | Message::CapabilitiesRes { .. }
            | Message::SoftKeyTemplateReq | Message::SoftKeySetReq | Message::RegisterAvailableLines { .. }
            | Message::StartMediaTransmissionAck { .. } | Message::FeatureStatusReq { .. }
            | Message::ForwardStatusReq { .. } | Message::IpPort { .. } => Ok(()),
            other => {
                debug!(peer = %self.peer_addr, ?other, "message accepted but not acted on");
                Ok(())
            }
        }
    }

    async fn handle_register<W: AsyncWrite + Unpin>(
        &mut self,
        name: String,
        device_type: u32,
        requested_proto: u8,
        writer: &Arc<Mutex<W>>,
        events_tx: &mpsc::UnboundedSender<HostEvent>,
    ) -> Result<()> {
        let Some(model) = crate::config::DeviceModel::from_wire(device_type) else {
            self.send(writer, Device::unsupported_type_reject(device_type)).await?;
            return Err(Error::UnsupportedDeviceType(device_type));
        };
        let _ = model;

        let Some(device_config) = self.config.device(&name) else {
            self.send(writer, Device::access_denied_reject(&name)).await?;
            return Err(Error::UnknownDevice(name));
        };

        let proto_version = Device::negotiate_proto_version(requested_proto);
        let device = Arc::new(Device::new(device_config.clone(), proto_version));

        if self.registry.add(device.clone()) == AddOutcome::AlreadyRegistered {
            self.send(writer, Device::access_denied_reject(&name)).await?;
            return Err(Error::DeviceAlreadyRegistered(name));
        }

        device.mark_registering();
        device.bind_inbox(events_tx.clone()).await;
        self.device = Some(device.clone());
        self.tasks.remove(&TaskKind::AuthTimeout);
        self.tasks.add(TaskKind::KeepaliveTimeout, device_config.keepalive as u64 * 2);

        let (keepalive, dateformat) = (device_config.keepalive, device_config.dateformat.clone());
        let (pad1, pad2, pad3) = Device::register_ack_pads(proto_version);
        self.send(writer, Message::RegisterAck { keepalive, dateformat, proto_version, pad1, pad2, pad3 }).await?;

        let bootstrap = device.bootstrap(self.host.as_ref()).await;
        self.send_all(writer, bootstrap).await?;
        info!(peer = %self.peer_addr, device = %name, proto_version, "device registered");
        Ok(())
    }

    async fn dispatch_host_event<W: AsyncWrite + Unpin>(&mut self, event: HostEvent, writer: &Arc<Mutex<W>>) -> Result<()> {
        if let HostEvent::ConfigReset { hard } = event {
            self.send(writer, Message::Reset { hard }).await?;
            return Err(Error::PeerClosed);
        }

        let Some(device) = self.device.clone() else { return Ok(()) };
        let line_instance = device.line_instance().await;
        let outcome = match event {
            HostEvent::IncomingCall { channel, caller_name, caller_number } => {
                device.handle_incoming_call(self.host.as_ref(), channel, &caller_name, &caller_number).await
            }
            HostEvent::Answer => device.handle_host_answer(self.host.as_ref()).await,
            HostEvent::Busy { congestion } => device.handle_host_busy(congestion).await,
            HostEvent::HintChanged { extension, state } => {
                let mut out = crate::device::Outcome::default();
                if let Some(msg) = device.handle_hint_change(&extension, state).await {
                    out.messages.push(msg);
                }
                out
            }
            HostEvent::ConfigReset { .. } => unreachable!("handled above"),
        };
        self.apply_outcome(outcome, line_instance, writer).await
    }

    async fn apply_outcome<W: AsyncWrite + Unpin>(&mut self, outcome: crate::device::Outcome, line_instance: u32, writer: &Arc<Mutex<W>>) -> Result<()> {
        for action in outcome.actions {
            match action {
                SessionAction::ScheduleDialplanPoll => self.tasks.add(TaskKind::DialplanPoll { line_instance }, 0),
                SessionAction::CancelDialplanPoll => self.tasks.remove(&TaskKind::DialplanPoll { line_instance }),
            }
        }
        self.send_all(writer, outcome.messages).await
    }

    async fn send<W: AsyncWrite + Unpin>(&self, writer: &Arc<Mutex<W>>, msg: Message) -> Result<()> {
        let mut w = writer.lock().await;
        write_frame(&mut *w, msg.id(), &msg.encode()).await
    }

    async fn send_all<W: AsyncWrite + Unpin>(&self, writer: &Arc<Mutex<W>>, msgs: Vec<Message>) -> Result<()> {
        for msg in msgs {
            self.send(writer, msg).await?;
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(device) = self.device.take() {
            device.mark_connlost();
            device.unbind_inbox().await;
            device.release_rtp_on_teardown(self.host.as_ref()).await;
            device.unsubscribe_all(self.host.as_ref()).await;
            self.registry.remove(&device.name);
            info!(peer = %self.peer_addr, device = %device.name, "device unregistered");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSnapshot, DeviceConfig, LineConfig};
    use async_trait::async_trait;
    use std::io::Cursor;

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

    fn snapshot() -> SharedConfig {
        Arc::new(ConfigSnapshot {
            bindaddr: "0.0.0.0".into(),
            devices: vec![DeviceConfig {
                name: "SEPA".into(),
                dateformat: "D.M.Y".into(),
                voicemail: "100".into(),
                keepalive: 30,
                authtimeout: 5,
                line: LineConfig { name: "100".into(), cid_name: "A".into(), cid_num: "100".into(), context: "default".into(), language: "en".into() },
                speeddials: vec![],
                codec_preference: vec![4],
            }],
        })
    }

    #[tokio::test]
    async fn unknown_device_name_is_rejected_with_its_own_name() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut session = Session::new("127.0.0.1:1000".parse().unwrap(), registry, snapshot(), Arc::new(NullHost));
        let writer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = session.handle_register("SEPUNKNOWN".into(), 115, 11, &writer, &tx).await.unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(_)));
        let buf = writer.lock().await;
        let mut cursor = Cursor::new(buf.clone());
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.id, crate::message::ids::REGISTER_REJ);
        let msg = Message::decode(frame.id, &frame.body).unwrap();
        assert!(matches!(msg, Message::RegisterRej { message } if message.contains("SEPUNKNOWN")));
    }

    #[tokio::test]
    async fn duplicate_register_is_rejected() {
        let registry = Arc::new(DeviceRegistry::new());
        let cfg = snapshot();
        let host: Arc<dyn Host> = Arc::new(NullHost);

        let mut first = Session::new("127.0.0.1:1".parse().unwrap(), registry.clone(), cfg.clone(), host.clone());
        let writer1 = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (tx1, _rx1) = mpsc::unbounded_channel();
        first.handle_register("SEPA".into(), 115, 11, &writer1, &tx1).await.unwrap();
        assert!(first.device.is_some());

        let mut second = Session::new("127.0.0.1:2".parse().unwrap(), registry, cfg, host);
        let writer2 = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let err = second.handle_register("SEPA".into(), 115, 11, &writer2, &tx2).await.unwrap_err();
        assert!(matches!(err, Error::DeviceAlreadyRegistered(_)));
        assert!(second.device.is_none());
    }

    #[tokio::test]
    async fn keepalive_before_registration_is_rejected() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut session = Session::new("127.0.0.1:1".parse().unwrap(), registry, snapshot(), Arc::new(NullHost));
        let writer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = session.dispatch_inbound(Message::KeepAlive, &writer, &tx).await.unwrap_err();
        assert!(matches!(err, Error::MessageOutOfOrder(_)));
        assert!(writer.lock().await.is_empty(), "no reply should be sent before closing");
    }

    #[tokio::test]
    async fn keepalive_after_registration_is_acknowledged() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut session = Session::new("127.0.0.1:1".parse().unwrap(), registry, snapshot(), Arc::new(NullHost));
        let writer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        session.handle_register("SEPA".into(), 115, 11, &writer, &tx).await.unwrap();
        writer.lock().await.clear();

        session.dispatch_inbound(Message::KeepAlive, &writer, &tx).await.unwrap();
        let buf = writer.lock().await;
        let mut cursor = Cursor::new(buf.clone());
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.id, crate::message::ids::KEEP_ALIVE_ACK);
    }
}
