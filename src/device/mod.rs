//! Per-device registration handshake and line/subchannel state machine
//! (spec.md §4.5). One `Device` per registered phone; the `Session`
//! that accepted its TCP connection owns an `Arc<Device>` once
//! registration succeeds.
//!
//! State and transition table grounded on `xivo-libsccp/src/sccp_device.c`
//! / `sccp_device.h`; side effects grounded on spec.md §4.5's event
//! table. The per-device lock is `tokio::sync::Mutex` rather than
//! `parking_lot`, deliberately: spec.md §5 requires MWI/hint callbacks
//! to hold the device lock *across* the host call and the subsequent
//! transmit, i.e. across await points.

pub mod line;
pub mod speeddial;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::error::Result;
use crate::host::{BlfState, ChannelHandle, ChannelState, Host};
use crate::message::{ButtonDefinition, Message, ProtoForm};

pub use line::{CallForwardStatus, Direction, Line, LineState, Subchannel};
pub use speeddial::SpeedDial;

pub const MAX_BUTTON_DEFINITION: usize = 42;

/// Softkey event codes acted on out of the full set decoded by
/// `SoftKeyEvent` (spec.md §4.5 table; `xivo-libsccp/sccp_device.h`).
const SOFTKEY_NEWCALL: u32 = 0x02;
const SOFTKEY_ENDCALL: u32 = 0x09;
const SPEAKER_ON: u32 = 1;
const SPEAKER_OFF: u32 = 2;
const RING_OFF: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    New,
    Registering,
    ConnLost,
}

impl RegistrationState {
    /// Enforces spec.md §3: `new -> registering -> (connlost)`, never
    /// reversed.
    fn can_advance_to(self, next: RegistrationState) -> bool {
        matches!(
            (self, next),
            (RegistrationState::New, RegistrationState::Registering)
                | (RegistrationState::Registering, RegistrationState::ConnLost)
                | (RegistrationState::New, RegistrationState::ConnLost)
        )
    }
}

/// Work the session must schedule/cancel on its task runner in
/// response to a device-level transition. Kept separate from
/// `Message` because it isn't wire traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    ScheduleDialplanPoll,
    CancelDialplanPoll,
}

/// Outbound messages plus session bookkeeping produced by a single
/// state transition.
#[derive(Debug, Default)]
pub struct Outcome {
    pub messages: Vec<Message>,
    pub actions: Vec<SessionAction>,
}

impl Outcome {
    fn msg(mut self, m: Message) -> Self {
        self.messages.push(m);
        self
    }
}

/// Pushed by host-adapter callbacks (incoming call, answer, hint/MWI
/// change) into whichever session currently has this device bound.
/// There is no event queue when no session is bound; `notify` is then
/// a no-op (spec.md §5: host events for an unregistered device are
/// dropped, not buffered).
#[derive(Debug, Clone)]
pub enum HostEvent {
    IncomingCall { channel: ChannelHandle, caller_name: String, caller_number: String },
    Answer,
    Busy { congestion: bool },
    HintChanged { extension: String, state: BlfState },
    /// A config reload left this device needing a phone-side reset
    /// (spec.md §6.6). The session sends `RESET` and ends itself;
    /// there's no device-state effect to apply, so this is handled
    /// directly by the session rather than through `Outcome`.
    ConfigReset { hard: bool },
}

struct DeviceInner {
    config: Arc<DeviceConfig>,
    line: Line,
    speeddials: Vec<SpeedDial>,
    mwi_subscription: Option<u64>,
}

pub struct Device {
    pub name: String,
    pub proto_version: u8,
    state: parking_lot::Mutex<RegistrationState>,
    inner: tokio::sync::Mutex<DeviceInner>,
    inbox: tokio::sync::Mutex<Option<mpsc::UnboundedSender<HostEvent>>>,
}

impl Device {
    pub fn new(config: DeviceConfig, proto_version: u8) -> Self {
        let line = Line::from_config(&config.line, 1);
        let speeddials = speeddial::assign_instances(config.speeddials.clone(), 1);
        Self {
            name: config.name.clone(),
            proto_version,
            state: parking_lot::Mutex::new(RegistrationState::New),
            inner: tokio::sync::Mutex::new(DeviceInner { config: Arc::new(config), line, speeddials, mwi_subscription: None }),
            inbox: tokio::sync::Mutex::new(None),
        }
    }

    /// Bind this device's event inbox to the session that just
    /// completed its registration handshake.
    pub async fn bind_inbox(&self, tx: mpsc::UnboundedSender<HostEvent>) {
        *self.inbox.lock().await = Some(tx);
    }

    pub async fn unbind_inbox(&self) {
        *self.inbox.lock().await = None;
    }

    /// Deliver a host-originated event to the bound session, if any.
    /// Returns `false` if nothing is listening.
    pub async fn notify(&self, event: HostEvent) -> bool {
        match self.inbox.lock().await.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.lock()
    }

    fn advance_state(&self, next: RegistrationState) {
        let mut guard = self.state.lock();
        if guard.can_advance_to(next) {
            *guard = next;
        } else {
            warn!(device = %self.name, from = ?*guard, to = ?next, "ignoring illegal registration state transition");
        }
    }

    pub fn mark_registering(&self) {
        self.advance_state(RegistrationState::Registering);
    }

    pub fn mark_connlost(&self) {
        self.advance_state(RegistrationState::ConnLost);
    }

    /// Clamp the phone's requested proto version to a supported value
    /// (spec.md §4.5 step 4).
    pub fn negotiate_proto_version(requested: u8) -> u8 {
        match requested {
            0..=3 => 3,
            4..=10 => requested,
            _ => 11,
        }
    }

    /// REGISTER_ACK pad bytes for a negotiated proto version
    /// (spec.md §6.5).
    pub fn register_ack_pads(proto_version: u8) -> (u8, u8, u8) {
        match proto_version {
            0..=3 => (0x00, 0x00, 0x00),
            4..=10 => (0x20, 0x00, 0xFE),
            _ => (0x20, 0xF1, 0xFF),
        }
    }

    pub fn unsupported_type_reject(type_id: u32) -> Message {
        Message::RegisterRej { message: format!("Unsupported device type [{}]", type_id) }
    }

    pub fn access_denied_reject(name: &str) -> Message {
        Message::RegisterRej { message: format!("Access denied: {}", name) }
    }

    fn button_template(line_instance: u32, speeddials: &[SpeedDial]) -> Message {
        let mut entries = vec![ButtonDefinition::Line { instance: line_instance }];
        for sd in speeddials {
            if entries.len() >= MAX_BUTTON_DEFINITION {
                break;
            }
            entries.push(ButtonDefinition::FeatureButton { instance: sd.instance });
        }
        while entries.len() < MAX_BUTTON_DEFINITION {
            entries.push(ButtonDefinition::None);
        }
        let total_count = 1 + speeddials.len() as u32;
        Message::ButtonTemplateRes { entries, total_count }
    }

    /// Step 5 of the registration handshake: `CAPABILITIES_REQ`,
    /// `CLEAR_MESSAGE`, initial voicemail lamp, MWI + per-speeddial
    /// hint subscriptions. Called once, right after the device is
    /// inserted into the registry and bound to its session.
    pub async fn bootstrap(&self, host: &dyn Host) -> Vec<Message> {
        let mut inner = self.inner.lock().await;
        let mailbox = inner.config.voicemail.clone();
        let context = inner.config.line.context.clone();

        let (new_count, _old_count) = match host.mwi_subscribe(&mailbox, &context).await {
            Some(id) => {
                inner.mwi_subscription = Some(id);
                host.mwi_query(&mailbox).await
            }
            None => {
                warn!(device = %self.name, mailbox, "MWI subscription failed, proceeding without voicemail notification");
                (0, 0)
            }
        };

        for sd in inner.speeddials.iter_mut() {
            if !sd.config.blf {
                continue;
            }
            match host.hint_subscribe(&context, &sd.config.extension).await {
                Some(id) => {
                    sd.subscription_id = Some(id);
                    sd.last_state = host.hint_query(&context, &sd.config.extension).await;
                }
                None => warn!(device = %self.name, extension = %sd.config.extension, "BLF subscription failed, speed dial stays dark"),
            }
        }

        vec![
            Message::CapabilitiesReq,
            Message::ClearMessage,
            Message::SetLamp { stimulus: 0x0F, instance: 0, state: if new_count > 0 { 2 } else { 1 } },
        ]
    }

    pub async fn handle_button_template_req(&self) -> Message {
        let inner = self.inner.lock().await;
        Self::button_template(inner.line.instance, &inner.speeddials)
    }

    pub async fn handle_line_status_req(&self, line_instance: u32) -> Result<Message> {
        let inner = self.inner.lock().await;
        if inner.line.instance != line_instance {
            return Err(crate::error::Error::NoSuchLineInstance(line_instance));
        }
        Ok(Message::LineStatusRes { line_instance, name: inner.line.display_name.clone(), display_name: inner.line.display_name.clone() })
    }

    pub async fn handle_speeddial_stat_req(&self, index: u32) -> Result<Message> {
        let inner = self.inner.lock().await;
        let sd = inner
            .speeddials
            .iter()
            .find(|s| s.config.index == index)
            .ok_or(crate::error::Error::NoSuchSpeeddialInstance(index))?;
        Ok(Message::SpeedDialStatRes { index, extension: sd.config.extension.clone(), label: sd.config.label.clone() })
    }

    /// Off-hook transition driven by the phone (spec.md §4.5 table,
    /// rows 1-2).
    pub async fn handle_offhook(&self, host: &dyn Host) -> Outcome {
        let mut inner = self.inner.lock().await;
        let line_instance = inner.line.instance;
        match inner.line.state {
            LineState::OnHook => {
                inner.line.state = LineState::OffHook;
                let subchan = inner.line.new_subchannel(Direction::Outgoing);
                Outcome::default()
                    .msg(Message::SetLamp { stimulus: 0x09, instance: line_instance, state: 2 })
                    .msg(Message::CallState { line_instance, call_id: subchan, state: state_code(LineState::OffHook) })
                    .msg(Message::StartTone { tone: 0x21, line_instance, call_id: subchan })
                    .msg(Message::SelectSoftKeys { line_instance, call_id: subchan, softkey_set: state_code(LineState::OffHook) })
                    .actions_push(SessionAction::ScheduleDialplanPoll)
            }
            LineState::RingIn => {
                let call_id = inner.line.active_subchan.unwrap_or(0);
                self.transition_to_connected(&mut inner, host, call_id).await
            }
            _ => Outcome::default(),
        }
    }

    /// On-hook transition, driven by the phone from any non-ONHOOK
    /// state (spec.md §4.5 table, row 3).
    pub async fn handle_onhook(&self, host: &dyn Host) -> Outcome {
        let mut inner = self.inner.lock().await;
        if inner.line.state == LineState::OnHook {
            return Outcome::default();
        }
        self.teardown(&mut inner, host).await
    }

    /// SOFTKEY_NEWCALL/SOFTKEY_ENDCALL are handled as OFFHOOK/ONHOOK
    /// with a speaker/ringer side effect transmitted first (spec.md
    /// §4.5 table); every other softkey code is a no-op for now.
    pub async fn handle_softkey_event(&self, event: u32, host: &dyn Host) -> Outcome {
        match event {
            SOFTKEY_NEWCALL => {
                let mut out = Outcome::default().msg(Message::SetSpeakerMode { mode: SPEAKER_ON });
                let offhook = self.handle_offhook(host).await;
                out.messages.extend(offhook.messages);
                out.actions.extend(offhook.actions);
                out
            }
            SOFTKEY_ENDCALL => {
                let mut out = Outcome::default()
                    .msg(Message::SetSpeakerMode { mode: SPEAKER_OFF })
                    .msg(Message::SetRinger { mode: RING_OFF });
                let onhook = self.handle_onhook(host).await;
                out.messages.extend(onhook.messages);
                out.actions.extend(onhook.actions);
                out
            }
            _ => Outcome::default(),
        }
    }

    async fn teardown(&self, inner: &mut DeviceInner, host: &dyn Host) -> Outcome {
        let line_instance = inner.line.instance;
        let call_id = inner.line.active_subchan.unwrap_or(0);

        if let Some(sub) = inner.line.active_subchannel().cloned() {
            if let Some(rtp) = sub.rtp {
                host.rtp_destroy(rtp).await;
            }
            if let Some(channel) = sub.channel {
                host.channel_hangup(channel).await;
            }
            inner.line.destroy_subchannel(sub.id);
        }
        inner.line.goto_onhook();

        Outcome::default()
            .msg(Message::CallState { line_instance, call_id, state: state_code(LineState::OnHook) })
            .msg(Message::SelectSoftKeys { line_instance, call_id, softkey_set: state_code(LineState::OnHook) })
            .msg(Message::CloseReceiveChannel { conference_id: 0, pass_thru_party_id: call_id ^ 0xFFFF_FFFF })
            .msg(Message::StopMediaTransmission { conference_id: 0, pass_thru_party_id: call_id ^ 0xFFFF_FFFF })
            .actions_push(SessionAction::CancelDialplanPoll)
    }

    /// Keypad digit while dialing: append to the pending buffer and
    /// stop the dial tone once the first digit arrives.
    pub async fn handle_keypad_offhook(&self, button: u8) -> Outcome {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.line.state, LineState::OffHook | LineState::RingOut) {
            return Outcome::default();
        }
        let first_digit = inner.line.pending_digits.is_empty();
        if let Some(c) = digit_to_char(button) {
            inner.line.pending_digits.push(c);
        }
        let line_instance = inner.line.instance;
        let call_id = inner.line.active_subchan.unwrap_or(0);
        let mut out = Outcome::default();
        if first_digit {
            out.messages.push(Message::StopTone { line_instance, call_id });
        }
        out
    }

    /// In-band DTMF while connected.
    pub async fn handle_keypad_connected(&self, button: u8, host: &dyn Host) -> Outcome {
        let inner = self.inner.lock().await;
        if inner.line.state != LineState::Connected {
            return Outcome::default();
        }
        if let (Some(c), Some(sub)) = (digit_to_char(button), inner.line.active_subchannel()) {
            if let Some(channel) = sub.channel {
                host.channel_send_digit(channel, c).await;
            }
        }
        Outcome::default()
    }

    /// Host-originated incoming call (spec.md §4.5 table).
    pub async fn handle_incoming_call(&self, host: &dyn Host, channel: crate::host::ChannelHandle, caller_name: &str, caller_number: &str) -> Outcome {
        let mut inner = self.inner.lock().await;
        if inner.line.state != LineState::OnHook {
            return Outcome::default();
        }
        inner.line.state = LineState::RingIn;
        let call_id = inner.line.new_subchannel(Direction::Incoming);
        if let Some(sub) = inner.line.subchannels.iter_mut().find(|s| s.id == call_id) {
            sub.channel = Some(channel);
        }
        host.channel_set_state(channel, ChannelState::Ringing).await;

        let line_instance = inner.line.instance;
        let cid_name = inner.line.cid_name.clone();
        let cid_number = inner.line.cid_number.clone();
        Outcome::default()
            .msg(Message::CallState { line_instance, call_id, state: state_code(LineState::RingIn) })
            .msg(Message::SelectSoftKeys { line_instance, call_id, softkey_set: state_code(LineState::RingIn) })
            .msg(Message::CallInfo {
                calling_name: caller_name.to_string(),
                calling_number: caller_number.to_string(),
                called_name: cid_name,
                called_number: cid_number,
                line_instance,
                call_id,
            })
            .msg(Message::SetLamp { stimulus: 0x09, instance: line_instance, state: 5 })
            .msg(Message::SetRinger { mode: 2 })
    }

    /// Host-originated answer of an outgoing call (spec.md §4.5 table).
    pub async fn handle_host_answer(&self, host: &dyn Host) -> Outcome {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.line.state, LineState::RingOut | LineState::OffHook) {
            return Outcome::default();
        }
        let call_id = inner.line.active_subchan.unwrap_or(0);
        self.transition_to_connected(&mut inner, host, call_id).await
    }

    async fn transition_to_connected(&self, inner: &mut DeviceInner, host: &dyn Host, call_id: u32) -> Outcome {
        inner.line.state = LineState::Connected;
        let line_instance = inner.line.instance;

        let rtp = host.rtp_new("0.0.0.0:0".parse().unwrap()).await;
        let codec = inner.config.codec_preference.first().copied().unwrap_or(0);
        if let Some(sub) = inner.line.active_subchannel_mut() {
            sub.state = LineState::Connected;
            sub.rtp = rtp;
            sub.codec = codec;
            if let Some(channel) = sub.channel {
                host.channel_set_state(channel, ChannelState::Up).await;
            }
        }

        Outcome::default()
            .msg(Message::SetRinger { mode: 1 })
            .msg(Message::CallState { line_instance, call_id, state: state_code(LineState::Connected) })
            .msg(Message::StopTone { line_instance, call_id })
            .msg(Message::OpenReceiveChannel { conference_id: 0, pass_thru_party_id: call_id, packet_ms: 20, codec, form: proto_form(self.proto_version) })
    }

    /// Busy/congestion indication from the host (spec.md §4.5 table).
    pub async fn handle_host_busy(&self, congestion: bool) -> Outcome {
        let mut inner = self.inner.lock().await;
        inner.line.state = if congestion { LineState::Congestion } else { LineState::Busy };
        let line_instance = inner.line.instance;
        let call_id = inner.line.active_subchan.unwrap_or(0);
        Outcome::default()
            .msg(Message::SetRinger { mode: 1 })
            .msg(Message::StartTone { tone: if congestion { 0x25 } else { 0x23 }, line_instance, call_id })
    }

    /// One tick of the cooperative dialplan-lookup task (spec.md §4.5
    /// "Dialplan lookup"). Returns the outbound effects and whether
    /// the poll should be rescheduled.
    pub async fn poll_dialplan(&self, host: &dyn Host) -> (Outcome, bool) {
        let mut inner = self.inner.lock().await;
        if inner.line.state != LineState::OffHook {
            return (Outcome::default(), false);
        }
        let context = inner.line.context.clone();
        let digits = inner.line.pending_digits.clone();
        if digits.is_empty() {
            return (Outcome::default(), true);
        }

        let exists = host.exten_exists(&context, &digits).await;
        if !exists {
            return (Outcome::default(), true);
        }
        if host.matchmore(&context, &digits).await {
            return (Outcome::default(), true);
        }

        inner.line.state = LineState::RingOut;
        let line_instance = inner.line.instance;
        let call_id = inner.line.active_subchan.unwrap_or(0);

        let channel = host.channel_alloc(&inner.line.display_name).await;
        let rtp = host.rtp_new("0.0.0.0:0".parse().unwrap()).await;
        if let Some(sub) = inner.line.active_subchannel_mut() {
            sub.channel = channel;
            sub.rtp = rtp;
        }
        if let Some(channel) = channel {
            host.pbx_start(channel).await;
        }

        let out = Outcome::default()
            .msg(Message::CallState { line_instance, call_id, state: state_code(LineState::RingOut) })
            .msg(Message::StartTone { tone: 0x24, line_instance, call_id })
            .msg(Message::CallInfo {
                calling_name: String::new(),
                calling_number: String::new(),
                called_name: String::new(),
                called_number: digits,
                line_instance,
                call_id,
            })
            .actions_push(SessionAction::CancelDialplanPoll);
        (out, false)
    }

    /// `ORC_ACK`: bind the phone's advertised RTP endpoint and ask it
    /// to start transmitting (spec.md §4.5 "Open-receive-channel
    /// handshake"). The xor-masking of `passThruPartyId` is required
    /// for phone compatibility and mirrors `transmit_close_receive_channel`
    /// in `xivo-libsccp/src/message.c`.
    pub async fn handle_open_receive_channel_ack(&self, host: &dyn Host, remote_ip: [u8; 4], remote_port: u32, pass_thru_party_id: u32) -> Outcome {
        let inner = self.inner.lock().await;
        let Some(sub) = inner.line.active_subchannel() else { return Outcome::default() };
        let Some(rtp) = sub.rtp else { return Outcome::default() };
        let addr: std::net::SocketAddr =
            format!("{}.{}.{}.{}:{}", remote_ip[0], remote_ip[1], remote_ip[2], remote_ip[3], remote_port).parse().unwrap();
        host.rtp_set_remote(rtp, addr).await;
        let local = host.rtp_local_addr(rtp).await;

        Outcome::default().msg(Message::StartMediaTransmission {
            conference_id: 0,
            pass_thru_party_id: pass_thru_party_id ^ 0xFFFF_FFFF,
            remote_ip: local.map(|a| ipv4_octets(a)).unwrap_or([0, 0, 0, 0]),
            remote_port: local.map(|a| a.port() as u32).unwrap_or(0),
            packet_ms: 20,
            codec: sub.codec,
        })
    }

    /// Field-by-field comparison against a freshly loaded
    /// configuration (spec.md §4.5 "Configuration reload", §6.6). If
    /// anything the phone can't reconcile live differs, the caller
    /// must send `RESET(soft)` and let the phone re-register; the
    /// config pointer is swapped either way.
    pub async fn apply_config_reload(&self, new_config: Arc<DeviceConfig>) -> bool {
        let mut inner = self.inner.lock().await;
        let needs_reset = inner.config.differs_for_live_reload(&new_config);
        inner.config = new_config;
        needs_reset
    }

    pub async fn unsubscribe_all(&self, host: &dyn Host) {
        let inner = self.inner.lock().await;
        if let Some(id) = inner.mwi_subscription {
            host.mwi_unsubscribe(id).await;
        }
        for sd in &inner.speeddials {
            if let Some(id) = sd.subscription_id {
                host.hint_unsubscribe(id).await;
            }
        }
    }

    pub async fn release_rtp_on_teardown(&self, host: &dyn Host) {
        let mut inner = self.inner.lock().await;
        let _ = self.teardown(&mut inner, host).await;
    }

    pub async fn line_instance(&self) -> u32 {
        self.inner.lock().await.line.instance
    }

    /// Notify the line of a BLF hint change for one of its speed
    /// dials (spec.md §5 "Host-event entry").
    pub async fn handle_hint_change(&self, extension: &str, new_state: BlfState) -> Option<Message> {
        let mut inner = self.inner.lock().await;
        let sd = inner.speeddials.iter_mut().find(|s| s.config.extension == extension)?;
        sd.last_state = new_state;
        debug!(device = %self.name, extension, ?new_state, "speed dial hint changed");
        Some(Message::FeatureStat { index: sd.config.index, feature_id: 0x02, enabled: new_state == BlfState::InUse })
    }
}

impl Outcome {
    fn actions_push(mut self, action: SessionAction) -> Self {
        self.actions.push(action);
        self
    }
}

fn state_code(state: LineState) -> u32 {
    match state {
        LineState::OffHook => 1,
        LineState::OnHook => 2,
        LineState::RingOut => 3,
        LineState::RingIn => 4,
        LineState::Connected => 5,
        LineState::Busy => 6,
        LineState::Congestion => 7,
        LineState::Hold => 8,
        LineState::CallWait => 9,
        LineState::Transfer => 10,
        LineState::Park => 11,
        LineState::Progress => 12,
        LineState::Invalid => 14,
    }
}

fn digit_to_char(button: u8) -> Option<char> {
    match button {
        0..=9 => char::from_digit(button as u32, 10),
        14 => Some('*'),
        15 => Some('#'),
        _ => None,
    }
}

fn proto_form(proto_version: u8) -> ProtoForm {
    if proto_version >= 17 {
        ProtoForm::V17Plus
    } else {
        ProtoForm::Legacy
    }
}

fn ipv4_octets(addr: std::net::SocketAddr) -> [u8; 4] {
    match addr {
        std::net::SocketAddr::V4(v4) => v4.ip().octets(),
        std::net::SocketAddr::V6(_) => [0, 0, 0, 0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, LineConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeHost {
        exists: bool,
        matchmore: bool,
        next_handle: AtomicU32,
    }

    #[async_trait]
    impl crate::host::PbxLookup for FakeHost {
        async fn exten_exists(&self, _context: &str, _exten: &str) -> bool {
            self.exists
        }
        async fn matchmore(&self, _context: &str, _exten: &str) -> bool {
            self.matchmore
        }
        async fn pbx_start(&self, _channel: crate::host::ChannelHandle) {}
    }

    #[async_trait]
    impl crate::host::ChannelHost for FakeHost {
        async fn channel_alloc(&self, _line_name: &str) -> Option<crate::host::ChannelHandle> {
            Some(self.next_handle.fetch_add(1, Ordering::SeqCst) as u64)
        }
        async fn channel_hangup(&self, _channel: crate::host::ChannelHandle) {}
        async fn channel_set_state(&self, _channel: crate::host::ChannelHandle, _state: ChannelState) {}
        async fn channel_send_digit(&self, _channel: crate::host::ChannelHandle, _digit: char) {}
    }

    #[async_trait]
    impl crate::host::RtpHost for FakeHost {
        async fn rtp_new(&self, _local_bind: std::net::SocketAddr) -> Option<crate::host::RtpHandle> {
            Some(self.next_handle.fetch_add(1, Ordering::SeqCst) as u64)
        }
        async fn rtp_set_remote(&self, _instance: crate::host::RtpHandle, _addr: std::net::SocketAddr) {}
        async fn rtp_local_addr(&self, _instance: crate::host::RtpHandle) -> Option<std::net::SocketAddr> {
            Some("127.0.0.1:16384".parse().unwrap())
        }
        async fn rtp_destroy(&self, _instance: crate::host::RtpHandle) {}
    }

    #[async_trait]
    impl crate::host::HintProvider for FakeHost {
        async fn hint_subscribe(&self, _context: &str, _exten: &str) -> Option<u64> {
            Some(1)
        }
        async fn hint_unsubscribe(&self, _id: u64) {}
        async fn hint_query(&self, _context: &str, _exten: &str) -> BlfState {
            BlfState::Idle
        }
    }

    #[async_trait]
    impl crate::host::MwiProvider for FakeHost {
        async fn mwi_subscribe(&self, _mailbox: &str, _context: &str) -> Option<u64> {
            Some(2)
        }
        async fn mwi_unsubscribe(&self, _id: u64) {}
        async fn mwi_query(&self, _mailbox: &str) -> (u32, u32) {
            (0, 0)
        }
    }

    fn device() -> Device {
        Device::new(
            DeviceConfig {
                name: "SEP001122334455".into(),
                dateformat: "D.M.Y".into(),
                voicemail: "100".into(),
                keepalive: 30,
                authtimeout: 5,
                line: LineConfig { name: "100".into(), cid_name: "Alice".into(), cid_num: "100".into(), context: "default".into(), language: "en".into() },
                speeddials: vec![],
                codec_preference: vec![4],
            },
            11,
        )
    }

    #[test]
    fn proto_version_clamps_per_table() {
        assert_eq!(Device::negotiate_proto_version(0), 3);
        assert_eq!(Device::negotiate_proto_version(3), 3);
        assert_eq!(Device::negotiate_proto_version(7), 7);
        assert_eq!(Device::negotiate_proto_version(10), 10);
        assert_eq!(Device::negotiate_proto_version(11), 11);
        assert_eq!(Device::negotiate_proto_version(200), 11);
    }

    #[test]
    fn register_ack_pads_per_table() {
        assert_eq!(Device::register_ack_pads(3), (0x00, 0x00, 0x00));
        assert_eq!(Device::register_ack_pads(7), (0x20, 0x00, 0xFE));
        assert_eq!(Device::register_ack_pads(11), (0x20, 0xF1, 0xFF));
    }

    #[test]
    fn registration_state_never_reverses() {
        let d = device();
        assert_eq!(d.state(), RegistrationState::New);
        d.mark_registering();
        assert_eq!(d.state(), RegistrationState::Registering);
        d.mark_connlost();
        assert_eq!(d.state(), RegistrationState::ConnLost);
        // illegal: connlost -> registering must be ignored
        d.mark_registering();
        assert_eq!(d.state(), RegistrationState::ConnLost);
    }

    #[tokio::test]
    async fn offhook_from_onhook_starts_dialplan_poll() {
        let d = device();
        let host = FakeHost { exists: false, matchmore: false, next_handle: AtomicU32::new(1) };
        let out = d.handle_offhook(&host).await;
        assert!(out.actions.contains(&SessionAction::ScheduleDialplanPoll));
        assert!(out.messages.iter().any(|m| matches!(m, Message::StartTone { .. })));
    }

    #[tokio::test]
    async fn onhook_from_offhook_closes_media() {
        let d = device();
        let host = FakeHost { exists: false, matchmore: false, next_handle: AtomicU32::new(1) };
        d.handle_offhook(&host).await;
        let out = d.handle_onhook(&host).await;
        assert!(out.messages.iter().any(|m| matches!(m, Message::CloseReceiveChannel { .. })));
        assert!(out.actions.contains(&SessionAction::CancelDialplanPoll));
    }

    #[tokio::test]
    async fn dialplan_commits_on_unambiguous_match() {
        let d = device();
        let host = FakeHost { exists: true, matchmore: false, next_handle: AtomicU32::new(1) };
        d.handle_offhook(&host).await;
        d.handle_keypad_offhook(1).await;
        d.handle_keypad_offhook(0).await;
        d.handle_keypad_offhook(0).await;
        let (out, keep_polling) = d.poll_dialplan(&host).await;
        assert!(!keep_polling);
        assert!(out.messages.iter().any(|m| matches!(m, Message::StartTone { tone: 0x24, .. })));
        assert!(out.messages.iter().any(|m| matches!(m, Message::CallInfo { called_number, .. } if called_number == "100")));
    }

    #[tokio::test]
    async fn dialplan_keeps_polling_while_ambiguous() {
        let d = device();
        let host = FakeHost { exists: true, matchmore: true, next_handle: AtomicU32::new(1) };
        d.handle_offhook(&host).await;
        d.handle_keypad_offhook(1).await;
        let (_out, keep_polling) = d.poll_dialplan(&host).await;
        assert!(keep_polling);
    }

    #[tokio::test]
    async fn incoming_call_then_answer_opens_media() {
        let d = device();
        let host = FakeHost { exists: false, matchmore: false, next_handle: AtomicU32::new(1) };
        let out = d.handle_incoming_call(&host, 99, "Bob", "200").await;
        assert!(out.messages.iter().any(|m| matches!(m, Message::CallState { state: 4, .. })));
        let out = d.handle_offhook(&host).await;
        assert!(out.messages.iter().any(|m| matches!(m, Message::OpenReceiveChannel { .. })));
    }

    #[tokio::test]
    async fn softkey_newcall_speaks_then_goes_offhook() {
        let d = device();
        let host = FakeHost { exists: false, matchmore: false, next_handle: AtomicU32::new(1) };
        let out = d.handle_softkey_event(SOFTKEY_NEWCALL, &host).await;
        assert!(matches!(out.messages[0], Message::SetSpeakerMode { mode } if mode == SPEAKER_ON));
        assert!(out.messages.iter().any(|m| matches!(m, Message::StartTone { .. })));
        assert!(out.actions.contains(&SessionAction::ScheduleDialplanPoll));
    }

    #[tokio::test]
    async fn softkey_endcall_silences_then_goes_onhook() {
        let d = device();
        let host = FakeHost { exists: false, matchmore: false, next_handle: AtomicU32::new(1) };
        d.handle_offhook(&host).await;
        let out = d.handle_softkey_event(SOFTKEY_ENDCALL, &host).await;
        assert!(matches!(out.messages[0], Message::SetSpeakerMode { mode } if mode == SPEAKER_OFF));
        assert!(matches!(out.messages[1], Message::SetRinger { mode } if mode == RING_OFF));
        assert!(out.messages.iter().any(|m| matches!(m, Message::CloseReceiveChannel { .. })));
        assert!(out.actions.contains(&SessionAction::CancelDialplanPoll));
    }

    #[tokio::test]
    async fn unrecognized_softkey_event_is_a_no_op() {
        let d = device();
        let host = FakeHost { exists: false, matchmore: false, next_handle: AtomicU32::new(1) };
        let out = d.handle_softkey_event(0x01, &host).await;
        assert!(out.messages.is_empty());
        assert!(out.actions.is_empty());
    }

    #[tokio::test]
    async fn config_reload_with_changed_dateformat_requires_reset() {
        let d = device();
        let mut new_cfg = DeviceConfig {
            name: "SEP001122334455".into(),
            dateformat: "M.D.Y".into(),
            voicemail: "100".into(),
            keepalive: 30,
            authtimeout: 5,
            line: LineConfig { name: "100".into(), cid_name: "Alice".into(), cid_num: "100".into(), context: "default".into(), language: "en".into() },
            speeddials: vec![],
            codec_preference: vec![4],
        };
        assert!(d.apply_config_reload(Arc::new(new_cfg.clone())).await);
        new_cfg.dateformat = "M.D.Y".into();
        assert!(!d.apply_config_reload(Arc::new(new_cfg)).await);
    }
}
