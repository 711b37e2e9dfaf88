//! The line and subchannel state machine (spec.md §3, §4.5). This
//! spec models exactly one `Line` per `Device`; `SpeedDial`s are
//! separate buttons, not lines.
//!
//! States and constants are taken from
//! `xivo-libsccp/src/sccp_device.h`'s `enum sccp_state` /
//! `enum sccp_direction` rather than guessed.

use crate::config::LineConfig;
use crate::host::{ChannelHandle, RtpHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    OnHook,
    OffHook,
    RingIn,
    RingOut,
    Connected,
    Hold,
    Busy,
    Congestion,
    Transfer,
    Park,
    Progress,
    CallWait,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallForwardStatus {
    Inactive,
    Inputting,
    Active,
}

/// A single call leg. Owned by the `Line` it belongs to; `line_instance`
/// is a non-owning back-reference (spec.md §9 design note), never used
/// after the owning `Line` has dropped the subchannel.
#[derive(Debug, Clone)]
pub struct Subchannel {
    pub id: u32,
    pub line_instance: u32,
    pub state: LineState,
    pub direction: Direction,
    pub on_hold: bool,
    pub rtp: Option<RtpHandle>,
    pub channel: Option<ChannelHandle>,
    pub codec: u32,
}

impl Subchannel {
    fn new(id: u32, line_instance: u32, direction: Direction) -> Self {
        Self { id, line_instance, state: LineState::OnHook, direction, on_hold: false, rtp: None, channel: None, codec: 0 }
    }
}

pub struct Line {
    pub instance: u32,
    pub display_name: String,
    pub cid_name: String,
    pub cid_number: String,
    pub context: String,
    pub language: String,
    pub forward_status: CallForwardStatus,
    pub forward_target: Option<String>,
    pub state: LineState,
    pub subchannels: Vec<Subchannel>,
    /// Non-owning reference to the active subchannel's id, if any.
    pub active_subchan: Option<u32>,
    pub pending_digits: String,
    next_subchan_id: u32,
}

impl Line {
    pub fn from_config(cfg: &LineConfig, instance: u32) -> Self {
        Self {
            instance,
            display_name: cfg.name.clone(),
            cid_name: cfg.cid_name.clone(),
            cid_number: cfg.cid_num.clone(),
            context: cfg.context.clone(),
            language: cfg.language.clone(),
            forward_status: CallForwardStatus::Inactive,
            forward_target: None,
            state: LineState::OnHook,
            subchannels: Vec::new(),
            active_subchan: None,
            pending_digits: String::new(),
            next_subchan_id: 1,
        }
    }

    pub fn active_subchannel(&self) -> Option<&Subchannel> {
        self.active_subchan.and_then(|id| self.subchannels.iter().find(|s| s.id == id))
    }

    pub fn active_subchannel_mut(&mut self) -> Option<&mut Subchannel> {
        let id = self.active_subchan?;
        self.subchannels.iter_mut().find(|s| s.id == id)
    }

    /// Create a new call leg, make it the active subchannel, and
    /// return its id. Invariant: `ONHOOK` has no active subchannel, so
    /// callers must transition `self.state` away from `OnHook` around
    /// this call.
    pub fn new_subchannel(&mut self, direction: Direction) -> u32 {
        let id = self.next_subchan_id;
        self.next_subchan_id += 1;
        self.subchannels.push(Subchannel::new(id, self.instance, direction));
        self.active_subchan = Some(id);
        id
    }

    /// Tear down and remove a subchannel. The caller is responsible
    /// for releasing its RTP resource through the host *before*
    /// calling this (spec.md §3 lifecycle: "its RTP resource is always
    /// released on exit paths").
    pub fn destroy_subchannel(&mut self, id: u32) {
        self.subchannels.retain(|s| s.id != id);
        if self.active_subchan == Some(id) {
            self.active_subchan = None;
        }
    }

    pub fn goto_onhook(&mut self) {
        self.state = LineState::OnHook;
        self.pending_digits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Line {
        Line::from_config(
            &LineConfig { name: "100".into(), cid_name: "Alice".into(), cid_num: "100".into(), context: "default".into(), language: "en".into() },
            1,
        )
    }

    #[test]
    fn onhook_has_no_active_subchannel() {
        let line = line();
        assert_eq!(line.state, LineState::OnHook);
        assert!(line.active_subchan.is_none());
    }

    #[test]
    fn subchannel_ids_are_monotonic_within_a_line() {
        let mut line = line();
        let a = line.new_subchannel(Direction::Outgoing);
        line.destroy_subchannel(a);
        let b = line.new_subchannel(Direction::Outgoing);
        assert!(b > a);
    }

    #[test]
    fn destroying_active_subchannel_clears_active_pointer() {
        let mut line = line();
        let id = line.new_subchannel(Direction::Incoming);
        assert_eq!(line.active_subchan, Some(id));
        line.destroy_subchannel(id);
        assert!(line.active_subchan.is_none());
        assert!(line.active_subchannel().is_none());
    }
}
