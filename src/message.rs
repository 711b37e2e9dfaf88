//! Typed representation of every SCCP message this driver understands,
//! plus their wire encode/decode. Message names are preserved from the
//! protocol for wire/log compatibility (spec.md §4.2); field layout is
//! grounded on `xivo-libsccp/src/message.c`'s `transmit_*` functions.
//!
//! Inbound message ids occupy the low range, outbound the high range,
//! matching the conventional Skinny split — this crate does not claim
//! bit-exact compatibility with any firmware (spec.md §1 non-goals),
//! only internal wire round-trip consistency. `decode` covers every
//! variant in both directions so the round-trip holds regardless of
//! which side happens to be parsing.

use crate::codec::{decode_u16_le, decode_u32_le, encode_u16_le, encode_u32_le};
use crate::error::{Error, Result};

pub mod ids {
    // Inbound
    pub const KEEP_ALIVE: u32 = 0x0000;
    pub const REGISTER: u32 = 0x0001;
    pub const IP_PORT: u32 = 0x0002;
    pub const KEYPAD_BUTTON: u32 = 0x0003;
    pub const OFFHOOK: u32 = 0x0006;
    pub const ONHOOK: u32 = 0x0007;
    pub const FORWARD_STATUS_REQ: u32 = 0x0009;
    pub const SPEEDDIAL_STAT_REQ: u32 = 0x000A;
    pub const LINE_STATUS_REQ: u32 = 0x000B;
    pub const CONFIG_STATUS_REQ: u32 = 0x000C;
    pub const TIME_DATE_REQ: u32 = 0x000D;
    pub const BUTTON_TEMPLATE_REQ: u32 = 0x000E;
    pub const CAPABILITIES_RES: u32 = 0x0010;
    pub const ALARM: u32 = 0x0020;
    pub const SOFTKEY_TEMPLATE_REQ: u32 = 0x0028;
    pub const SOFTKEY_SET_REQ: u32 = 0x0025;
    pub const SOFTKEY_EVENT: u32 = 0x0026;
    pub const UNREGISTER: u32 = 0x0027;
    pub const REGISTER_AVAILABLE_LINES: u32 = 0x002B;
    pub const OPEN_RECEIVE_CHANNEL_ACK: u32 = 0x0022;
    pub const START_MEDIA_TRANSMISSION_ACK: u32 = 0x0023;
    pub const FEATURE_STATUS_REQ: u32 = 0x0024;

    // Outbound
    pub const KEEP_ALIVE_ACK: u32 = 0x0100;
    pub const REGISTER_ACK: u32 = 0x0081;
    pub const REGISTER_REJ: u32 = 0x0082;
    pub const CAPABILITIES_REQ: u32 = 0x0095;
    pub const CLEAR_MESSAGE: u32 = 0x0111;
    pub const BUTTON_TEMPLATE_RES: u32 = 0x0097;
    pub const LINE_STATUS_RES: u32 = 0x0092;
    pub const CONFIG_STATUS_RES: u32 = 0x0093;
    pub const DATE_TIME_RES: u32 = 0x0094;
    pub const SOFTKEY_TEMPLATE_RES: u32 = 0x0108;
    pub const SOFTKEY_SET_RES: u32 = 0x0109;
    pub const FORWARD_STATUS_RES: u32 = 0x0099;
    pub const SPEEDDIAL_STAT_RES: u32 = 0x009B;
    pub const FEATURE_STAT: u32 = 0x0100 + 1;
    pub const OPEN_RECEIVE_CHANNEL: u32 = 0x0105;
    pub const CLOSE_RECEIVE_CHANNEL: u32 = 0x0106;
    pub const START_MEDIA_TRANSMISSION: u32 = 0x008A;
    pub const STOP_MEDIA_TRANSMISSION: u32 = 0x008B;
    pub const CALL_STATE: u32 = 0x0111 + 1;
    pub const CALL_INFO: u32 = 0x008F;
    pub const DISPLAY_MESSAGE: u32 = 0x0110;
    pub const SET_LAMP: u32 = 0x0086;
    pub const SET_RINGER: u32 = 0x0085;
    pub const SET_SPEAKER_MODE: u32 = 0x0088;
    pub const START_TONE: u32 = 0x0082 + 0x1000;
    pub const STOP_TONE: u32 = 0x0083 + 0x1000;
    pub const SELECT_SOFT_KEYS: u32 = 0x0113;
    pub const ACTIVATE_CALL_PLANE: u32 = 0x0108 + 0x10;
    pub const RESET: u32 = 0x008D;
}

fn encode_fixed_str(s: &str, width: usize) -> Vec<u8> {
    let mut buf = vec![0u8; width];
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn decode_fixed_str(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).into_owned()
}

fn need(body: &[u8], n: usize) -> Result<()> {
    if body.len() < n {
        Err(Error::FrameTooShort)
    } else {
        Ok(())
    }
}

const NAME_WIDTH: usize = 40;

/// `OPEN_RECEIVE_CHANNEL` grows an extra word on proto_version >= 17
/// (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoForm {
    Legacy,
    V17Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // --- Inbound ---
    KeepAlive,
    Register { name: String, device_type: u32, proto_version: u8, max_streams: u32 },
    IpPort { port: u16 },
    KeypadButton { line_instance: u32, call_id: u32, button: u8 },
    OffHook { line_instance: u32, call_id: u32 },
    OnHook { line_instance: u32, call_id: u32 },
    ForwardStatusReq { line_instance: u32 },
    CapabilitiesRes { codecs: Vec<u32> },
    LineStatusReq { line_instance: u32 },
    ConfigStatusReq,
    TimeDateReq,
    ButtonTemplateReq,
    SoftKeyTemplateReq,
    Alarm { message: String },
    SoftKeyEvent { event: u32, line_instance: u32, call_id: u32 },
    OpenReceiveChannelAck { status: u32, ip: [u8; 4], port: u32, pass_thru_party_id: u32 },
    SoftKeySetReq,
    RegisterAvailableLines { line_count: u32 },
    StartMediaTransmissionAck { pass_thru_party_id: u32, status: u32 },
    SpeedDialStatReq { index: u32 },
    FeatureStatusReq { index: u32 },
    Unregister,

    // --- Outbound ---
    KeepAliveAck,
    RegisterAck { keepalive: u16, dateformat: String, proto_version: u8, pad1: u8, pad2: u8, pad3: u8 },
    RegisterRej { message: String },
    CapabilitiesReq,
    ClearMessage,
    ButtonTemplateRes { entries: Vec<ButtonDefinition>, total_count: u32 },
    LineStatusRes { line_instance: u32, name: String, display_name: String },
    ConfigStatusRes { name: String, line_count: u32, speeddial_count: u32 },
    DateTimeRes { year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32 },
    SoftKeyTemplateRes,
    SoftKeySetRes,
    ForwardStatusRes { line_instance: u32, active: bool, forward_number: String },
    SpeedDialStatRes { index: u32, extension: String, label: String },
    FeatureStat { index: u32, feature_id: u32, enabled: bool },
    OpenReceiveChannel { conference_id: u32, pass_thru_party_id: u32, packet_ms: u32, codec: u32, form: ProtoForm },
    CloseReceiveChannel { conference_id: u32, pass_thru_party_id: u32 },
    StartMediaTransmission { conference_id: u32, pass_thru_party_id: u32, remote_ip: [u8; 4], remote_port: u32, packet_ms: u32, codec: u32 },
    StopMediaTransmission { conference_id: u32, pass_thru_party_id: u32 },
    CallState { line_instance: u32, call_id: u32, state: u32 },
    CallInfo { calling_name: String, calling_number: String, called_name: String, called_number: String, line_instance: u32, call_id: u32 },
    DisplayMessage { text: String },
    SetLamp { stimulus: u32, instance: u32, state: u32 },
    SetRinger { mode: u32 },
    SetSpeakerMode { mode: u32 },
    StartTone { tone: u32, line_instance: u32, call_id: u32 },
    StopTone { line_instance: u32, call_id: u32 },
    SelectSoftKeys { line_instance: u32, call_id: u32, softkey_set: u32 },
    ActivateCallPlane { line_instance: u32 },
    Reset { hard: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonDefinition {
    Line { instance: u32 },
    FeatureButton { instance: u32 },
    None,
}

impl Message {
    pub fn id(&self) -> u32 {
        use ids::*;
        match self {
            Message::KeepAlive => KEEP_ALIVE,
            Message::Register { .. } => REGISTER,
            Message::IpPort { .. } => IP_PORT,
            Message::KeypadButton { .. } => KEYPAD_BUTTON,
            Message::OffHook { .. } => OFFHOOK,
            Message::OnHook { .. } => ONHOOK,
            Message::ForwardStatusReq { .. } => FORWARD_STATUS_REQ,
            Message::CapabilitiesRes { .. } => CAPABILITIES_RES,
            Message::LineStatusReq { .. } => LINE_STATUS_REQ,
            Message::ConfigStatusReq => CONFIG_STATUS_REQ,
            Message::TimeDateReq => TIME_DATE_REQ,
            Message::ButtonTemplateReq => BUTTON_TEMPLATE_REQ,
            Message::SoftKeyTemplateReq => SOFTKEY_TEMPLATE_REQ,
            Message::Alarm { .. } => ALARM,
            Message::SoftKeyEvent { .. } => SOFTKEY_EVENT,
            Message::OpenReceiveChannelAck { .. } => OPEN_RECEIVE_CHANNEL_ACK,
            Message::SoftKeySetReq => SOFTKEY_SET_REQ,
            Message::RegisterAvailableLines { .. } => REGISTER_AVAILABLE_LINES,
            Message::StartMediaTransmissionAck { .. } => START_MEDIA_TRANSMISSION_ACK,
            Message::SpeedDialStatReq { .. } => SPEEDDIAL_STAT_REQ,
            Message::FeatureStatusReq { .. } => FEATURE_STATUS_REQ,
            Message::Unregister => UNREGISTER,

            Message::KeepAliveAck => KEEP_ALIVE_ACK,
            Message::RegisterAck { .. } => REGISTER_ACK,
            Message::RegisterRej { .. } => REGISTER_REJ,
            Message::CapabilitiesReq => CAPABILITIES_REQ,
            Message::ClearMessage => CLEAR_MESSAGE,
            Message::ButtonTemplateRes { .. } => BUTTON_TEMPLATE_RES,
            Message::LineStatusRes { .. } => LINE_STATUS_RES,
            Message::ConfigStatusRes { .. } => CONFIG_STATUS_RES,
            Message::DateTimeRes { .. } => DATE_TIME_RES,
            Message::SoftKeyTemplateRes => SOFTKEY_TEMPLATE_RES,
            Message::SoftKeySetRes => SOFTKEY_SET_RES,
            Message::ForwardStatusRes { .. } => FORWARD_STATUS_RES,
            Message::SpeedDialStatRes { .. } => SPEEDDIAL_STAT_RES,
            Message::FeatureStat { .. } => FEATURE_STAT,
            Message::OpenReceiveChannel { .. } => OPEN_RECEIVE_CHANNEL,
            Message::CloseReceiveChannel { .. } => CLOSE_RECEIVE_CHANNEL,
            Message::StartMediaTransmission { .. } => START_MEDIA_TRANSMISSION,
            Message::StopMediaTransmission { .. } => STOP_MEDIA_TRANSMISSION,
            Message::CallState { .. } => CALL_STATE,
            Message::CallInfo { .. } => CALL_INFO,
            Message::DisplayMessage { .. } => DISPLAY_MESSAGE,
            Message::SetLamp { .. } => SET_LAMP,
            Message::SetRinger { .. } => SET_RINGER,
            Message::SetSpeakerMode { .. } => SET_SPEAKER_MODE,
            Message::StartTone { .. } => START_TONE,
            Message::StopTone { .. } => STOP_TONE,
            Message::SelectSoftKeys { .. } => SELECT_SOFT_KEYS,
            Message::ActivateCallPlane { .. } => ACTIVATE_CALL_PLANE,
            Message::Reset { .. } => RESET,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = Vec::new();
        match self {
            Message::KeepAlive | Message::ConfigStatusReq | Message::TimeDateReq
            | Message::ButtonTemplateReq | Message::SoftKeyTemplateReq | Message::SoftKeySetReq
            | Message::Unregister | Message::KeepAliveAck | Message::CapabilitiesReq
            | Message::ClearMessage | Message::SoftKeyTemplateRes | Message::SoftKeySetRes => {}

            Message::Register { name, device_type, proto_version, max_streams } => {
                b.extend(encode_fixed_str(name, NAME_WIDTH));
                b.extend(encode_u32_le(*device_type));
                b.extend(encode_u32_le(*max_streams));
                b.push(*proto_version);
            }
            Message::IpPort { port } => b.extend(encode_u16_le(*port)),
            Message::KeypadButton { line_instance, call_id, button } => {
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
                b.push(*button);
            }
            Message::OffHook { line_instance, call_id } | Message::OnHook { line_instance, call_id } => {
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
            }
            Message::ForwardStatusReq { line_instance } | Message::LineStatusReq { line_instance }
            | Message::ActivateCallPlane { line_instance } => b.extend(encode_u32_le(*line_instance)),
            Message::CapabilitiesRes { codecs } => {
                b.extend(encode_u32_le(codecs.len() as u32));
                for c in codecs {
                    b.extend(encode_u32_le(*c));
                }
            }
            Message::Alarm { message } => b.extend(encode_fixed_str(message, 80)),
            Message::SoftKeyEvent { event, line_instance, call_id } => {
                b.extend(encode_u32_le(*event));
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
            }
            Message::OpenReceiveChannelAck { status, ip, port, pass_thru_party_id } => {
                b.extend(encode_u32_le(*status));
                b.extend_from_slice(ip);
                b.extend(encode_u32_le(*port));
                b.extend(encode_u32_le(*pass_thru_party_id));
            }
            Message::RegisterAvailableLines { line_count } => b.extend(encode_u32_le(*line_count)),
            Message::StartMediaTransmissionAck { pass_thru_party_id, status } => {
                b.extend(encode_u32_le(*pass_thru_party_id));
                b.extend(encode_u32_le(*status));
            }
            Message::SpeedDialStatReq { index } | Message::FeatureStatusReq { index } => {
                b.extend(encode_u32_le(*index))
            }

            Message::RegisterAck { keepalive, dateformat, proto_version, pad1, pad2, pad3 } => {
                b.extend(encode_u16_le(*keepalive));
                b.extend(encode_fixed_str(dateformat, 6));
                b.push(*proto_version);
                b.push(*pad1);
                b.push(*pad2);
                b.push(*pad3);
            }
            Message::RegisterRej { message } => b.extend(encode_fixed_str(message, 33)),
            Message::ButtonTemplateRes { entries, total_count } => {
                b.extend(encode_u32_le(*total_count));
                for e in entries {
                    let (kind, instance) = match e {
                        ButtonDefinition::Line { instance } => (1u8, *instance),
                        ButtonDefinition::FeatureButton { instance } => (2u8, *instance),
                        ButtonDefinition::None => (0u8, 0),
                    };
                    b.push(kind);
                    b.extend(encode_u32_le(instance));
                }
            }
            Message::LineStatusRes { line_instance, name, display_name } => {
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_fixed_str(name, NAME_WIDTH));
                b.extend(encode_fixed_str(display_name, NAME_WIDTH));
            }
            Message::ConfigStatusRes { name, line_count, speeddial_count } => {
                b.extend(encode_fixed_str(name, NAME_WIDTH));
                b.extend(encode_u32_le(*line_count));
                b.extend(encode_u32_le(*speeddial_count));
            }
            Message::DateTimeRes { year, month, day, hour, minute, second } => {
                for v in [year, month, day, hour, minute, second] {
                    b.extend(encode_u32_le(*v));
                }
            }
            Message::ForwardStatusRes { line_instance, active, forward_number } => {
                b.extend(encode_u32_le(*line_instance));
                b.push(*active as u8);
                b.extend(encode_fixed_str(forward_number, NAME_WIDTH));
            }
            Message::SpeedDialStatRes { index, extension, label } => {
                b.extend(encode_u32_le(*index));
                b.extend(encode_fixed_str(extension, NAME_WIDTH));
                b.extend(encode_fixed_str(label, NAME_WIDTH));
            }
            Message::FeatureStat { index, feature_id, enabled } => {
                b.extend(encode_u32_le(*index));
                b.extend(encode_u32_le(*feature_id));
                b.push(*enabled as u8);
            }
            Message::OpenReceiveChannel { conference_id, pass_thru_party_id, packet_ms, codec, form } => {
                b.extend(encode_u32_le(*conference_id));
                b.extend(encode_u32_le(*pass_thru_party_id));
                b.extend(encode_u32_le(*packet_ms));
                b.extend(encode_u32_le(*codec));
                if *form == ProtoForm::V17Plus {
                    b.extend(encode_u32_le(0)); // extended v17+ reserved word
                }
            }
            Message::CloseReceiveChannel { conference_id, pass_thru_party_id }
            | Message::StopMediaTransmission { conference_id, pass_thru_party_id } => {
                b.extend(encode_u32_le(*conference_id));
                b.extend(encode_u32_le(*pass_thru_party_id));
            }
            Message::StartMediaTransmission { conference_id, pass_thru_party_id, remote_ip, remote_port, packet_ms, codec } => {
                b.extend(encode_u32_le(*conference_id));
                b.extend(encode_u32_le(*pass_thru_party_id));
                b.extend_from_slice(remote_ip);
                b.extend(encode_u32_le(*remote_port));
                b.extend(encode_u32_le(*packet_ms));
                b.extend(encode_u32_le(*codec));
            }
            Message::CallState { line_instance, call_id, state } => {
                b.extend(encode_u32_le(*state));
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
            }
            Message::CallInfo { calling_name, calling_number, called_name, called_number, line_instance, call_id } => {
                b.extend(encode_fixed_str(calling_name, NAME_WIDTH));
                b.extend(encode_fixed_str(calling_number, NAME_WIDTH));
                b.extend(encode_fixed_str(called_name, NAME_WIDTH));
                b.extend(encode_fixed_str(called_number, NAME_WIDTH));
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
            }
            Message::DisplayMessage { text } => b.extend(encode_fixed_str(text, 32)),
            Message::SetLamp { stimulus, instance, state } => {
                b.extend(encode_u32_le(*stimulus));
                b.extend(encode_u32_le(*instance));
                b.extend(encode_u32_le(*state));
            }
            Message::SetRinger { mode } | Message::SetSpeakerMode { mode } => b.extend(encode_u32_le(*mode)),
            Message::StartTone { tone, line_instance, call_id } => {
                b.extend(encode_u32_le(*tone));
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
            }
            Message::StopTone { line_instance, call_id } => {
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
            }
            Message::SelectSoftKeys { line_instance, call_id, softkey_set } => {
                b.extend(encode_u32_le(*line_instance));
                b.extend(encode_u32_le(*call_id));
                b.extend(encode_u32_le(*softkey_set));
            }
            Message::Reset { hard } => b.extend(encode_u32_le(*hard as u32)),
        }
        b
    }

    /// Decode a message body given its wire id. `OPEN_RECEIVE_CHANNEL`'s
    /// `ProtoForm` is inferred from body length rather than passed in,
    /// since the v17+ form simply carries one extra trailing word
    /// (spec.md §4.2).
    pub fn decode(id: u32, body: &[u8]) -> Result<Message> {
        use ids::*;
        Ok(match id {
            KEEP_ALIVE => Message::KeepAlive,
            REGISTER => {
                need(body, NAME_WIDTH + 9)?;
                let name = decode_fixed_str(&body[0..NAME_WIDTH]);
                let device_type = decode_u32_le(&body[NAME_WIDTH..NAME_WIDTH + 4]);
                let max_streams = decode_u32_le(&body[NAME_WIDTH + 4..NAME_WIDTH + 8]);
                let proto_version = body[NAME_WIDTH + 8];
                Message::Register { name, device_type, proto_version, max_streams }
            }
            IP_PORT => {
                need(body, 2)?;
                Message::IpPort { port: decode_u16_le(&body[0..2]) }
            }
            KEYPAD_BUTTON => {
                need(body, 9)?;
                Message::KeypadButton {
                    line_instance: decode_u32_le(&body[0..4]),
                    call_id: decode_u32_le(&body[4..8]),
                    button: body[8],
                }
            }
            OFFHOOK => {
                need(body, 8)?;
                Message::OffHook { line_instance: decode_u32_le(&body[0..4]), call_id: decode_u32_le(&body[4..8]) }
            }
            ONHOOK => {
                need(body, 8)?;
                Message::OnHook { line_instance: decode_u32_le(&body[0..4]), call_id: decode_u32_le(&body[4..8]) }
            }
            FORWARD_STATUS_REQ => {
                need(body, 4)?;
                Message::ForwardStatusReq { line_instance: decode_u32_le(&body[0..4]) }
            }
            CAPABILITIES_RES => {
                need(body, 4)?;
                let n = decode_u32_le(&body[0..4]) as usize;
                need(body, 4 + n * 4)?;
                let codecs = (0..n)
                    .map(|i| decode_u32_le(&body[4 + i * 4..8 + i * 4]))
                    .collect();
                Message::CapabilitiesRes { codecs }
            }
            LINE_STATUS_REQ => {
                need(body, 4)?;
                Message::LineStatusReq { line_instance: decode_u32_le(&body[0..4]) }
            }
            CONFIG_STATUS_REQ => Message::ConfigStatusReq,
            TIME_DATE_REQ => Message::TimeDateReq,
            BUTTON_TEMPLATE_REQ => Message::ButtonTemplateReq,
            SOFTKEY_TEMPLATE_REQ => Message::SoftKeyTemplateReq,
            ALARM => Message::Alarm { message: decode_fixed_str(body) },
            SOFTKEY_EVENT => {
                need(body, 12)?;
                Message::SoftKeyEvent {
                    event: decode_u32_le(&body[0..4]),
                    line_instance: decode_u32_le(&body[4..8]),
                    call_id: decode_u32_le(&body[8..12]),
                }
            }
            OPEN_RECEIVE_CHANNEL_ACK => {
                need(body, 16)?;
                Message::OpenReceiveChannelAck {
                    status: decode_u32_le(&body[0..4]),
                    ip: [body[4], body[5], body[6], body[7]],
                    port: decode_u32_le(&body[8..12]),
                    pass_thru_party_id: decode_u32_le(&body[12..16]),
                }
            }
            SOFTKEY_SET_REQ => Message::SoftKeySetReq,
            REGISTER_AVAILABLE_LINES => {
                need(body, 4)?;
                Message::RegisterAvailableLines { line_count: decode_u32_le(&body[0..4]) }
            }
            START_MEDIA_TRANSMISSION_ACK => {
                need(body, 8)?;
                Message::StartMediaTransmissionAck {
                    pass_thru_party_id: decode_u32_le(&body[0..4]),
                    status: decode_u32_le(&body[4..8]),
                }
            }
            SPEEDDIAL_STAT_REQ => {
                need(body, 4)?;
                Message::SpeedDialStatReq { index: decode_u32_le(&body[0..4]) }
            }
            FEATURE_STATUS_REQ => {
                need(body, 4)?;
                Message::FeatureStatusReq { index: decode_u32_le(&body[0..4]) }
            }
            UNREGISTER => Message::Unregister,

            KEEP_ALIVE_ACK => Message::KeepAliveAck,
            REGISTER_ACK => {
                need(body, 12)?;
                Message::RegisterAck {
                    keepalive: decode_u16_le(&body[0..2]),
                    dateformat: decode_fixed_str(&body[2..8]),
                    proto_version: body[8],
                    pad1: body[9],
                    pad2: body[10],
                    pad3: body[11],
                }
            }
            REGISTER_REJ => Message::RegisterRej { message: decode_fixed_str(body) },
            CAPABILITIES_REQ => Message::CapabilitiesReq,
            CLEAR_MESSAGE => Message::ClearMessage,
            BUTTON_TEMPLATE_RES => {
                need(body, 4)?;
                let total_count = decode_u32_le(&body[0..4]);
                let n = (body.len() - 4) / 5;
                need(body, 4 + n * 5)?;
                let entries = (0..n)
                    .map(|i| {
                        let off = 4 + i * 5;
                        let instance = decode_u32_le(&body[off + 1..off + 5]);
                        match body[off] {
                            1 => ButtonDefinition::Line { instance },
                            2 => ButtonDefinition::FeatureButton { instance },
                            _ => ButtonDefinition::None,
                        }
                    })
                    .collect();
                Message::ButtonTemplateRes { entries, total_count }
            }
            LINE_STATUS_RES => {
                need(body, 4 + NAME_WIDTH * 2)?;
                Message::LineStatusRes {
                    line_instance: decode_u32_le(&body[0..4]),
                    name: decode_fixed_str(&body[4..4 + NAME_WIDTH]),
                    display_name: decode_fixed_str(&body[4 + NAME_WIDTH..4 + NAME_WIDTH * 2]),
                }
            }
            CONFIG_STATUS_RES => {
                need(body, NAME_WIDTH + 8)?;
                Message::ConfigStatusRes {
                    name: decode_fixed_str(&body[0..NAME_WIDTH]),
                    line_count: decode_u32_le(&body[NAME_WIDTH..NAME_WIDTH + 4]),
                    speeddial_count: decode_u32_le(&body[NAME_WIDTH + 4..NAME_WIDTH + 8]),
                }
            }
            DATE_TIME_RES => {
                need(body, 24)?;
                Message::DateTimeRes {
                    year: decode_u32_le(&body[0..4]),
                    month: decode_u32_le(&body[4..8]),
                    day: decode_u32_le(&body[8..12]),
                    hour: decode_u32_le(&body[12..16]),
                    minute: decode_u32_le(&body[16..20]),
                    second: decode_u32_le(&body[20..24]),
                }
            }
            SOFTKEY_TEMPLATE_RES => Message::SoftKeyTemplateRes,
            SOFTKEY_SET_RES => Message::SoftKeySetRes,
            FORWARD_STATUS_RES => {
                need(body, 5 + NAME_WIDTH)?;
                Message::ForwardStatusRes {
                    line_instance: decode_u32_le(&body[0..4]),
                    active: body[4] != 0,
                    forward_number: decode_fixed_str(&body[5..5 + NAME_WIDTH]),
                }
            }
            SPEEDDIAL_STAT_RES => {
                need(body, 4 + NAME_WIDTH * 2)?;
                Message::SpeedDialStatRes {
                    index: decode_u32_le(&body[0..4]),
                    extension: decode_fixed_str(&body[4..4 + NAME_WIDTH]),
                    label: decode_fixed_str(&body[4 + NAME_WIDTH..4 + NAME_WIDTH * 2]),
                }
            }
            FEATURE_STAT => {
                need(body, 9)?;
                Message::FeatureStat {
                    index: decode_u32_le(&body[0..4]),
                    feature_id: decode_u32_le(&body[4..8]),
                    enabled: body[8] != 0,
                }
            }
            OPEN_RECEIVE_CHANNEL => {
                need(body, 16)?;
                let form = if body.len() >= 20 { ProtoForm::V17Plus } else { ProtoForm::Legacy };
                Message::OpenReceiveChannel {
                    conference_id: decode_u32_le(&body[0..4]),
                    pass_thru_party_id: decode_u32_le(&body[4..8]),
                    packet_ms: decode_u32_le(&body[8..12]),
                    codec: decode_u32_le(&body[12..16]),
                    form,
                }
            }
            CLOSE_RECEIVE_CHANNEL => {
                need(body, 8)?;
                Message::CloseReceiveChannel {
                    conference_id: decode_u32_le(&body[0..4]),
                    pass_thru_party_id: decode_u32_le(&body[4..8]),
                }
            }
            START_MEDIA_TRANSMISSION => {
                need(body, 24)?;
                Message::StartMediaTransmission {
                    conference_id: decode_u32_le(&body[0..4]),
                    pass_thru_party_id: decode_u32_le(&body[4..8]),
                    remote_ip: [body[8], body[9], body[10], body[11]],
                    remote_port: decode_u32_le(&body[12..16]),
                    packet_ms: decode_u32_le(&body[16..20]),
                    codec: decode_u32_le(&body[20..24]),
                }
            }
            STOP_MEDIA_TRANSMISSION => {
                need(body, 8)?;
                Message::StopMediaTransmission {
                    conference_id: decode_u32_le(&body[0..4]),
                    pass_thru_party_id: decode_u32_le(&body[4..8]),
                }
            }
            CALL_STATE => {
                need(body, 12)?;
                Message::CallState {
                    state: decode_u32_le(&body[0..4]),
                    line_instance: decode_u32_le(&body[4..8]),
                    call_id: decode_u32_le(&body[8..12]),
                }
            }
            CALL_INFO => {
                need(body, NAME_WIDTH * 4 + 8)?;
                Message::CallInfo {
                    calling_name: decode_fixed_str(&body[0..NAME_WIDTH]),
                    calling_number: decode_fixed_str(&body[NAME_WIDTH..NAME_WIDTH * 2]),
                    called_name: decode_fixed_str(&body[NAME_WIDTH * 2..NAME_WIDTH * 3]),
                    called_number: decode_fixed_str(&body[NAME_WIDTH * 3..NAME_WIDTH * 4]),
                    line_instance: decode_u32_le(&body[NAME_WIDTH * 4..NAME_WIDTH * 4 + 4]),
                    call_id: decode_u32_le(&body[NAME_WIDTH * 4 + 4..NAME_WIDTH * 4 + 8]),
                }
            }
            DISPLAY_MESSAGE => Message::DisplayMessage { text: decode_fixed_str(body) },
            SET_LAMP => {
                need(body, 12)?;
                Message::SetLamp {
                    stimulus: decode_u32_le(&body[0..4]),
                    instance: decode_u32_le(&body[4..8]),
                    state: decode_u32_le(&body[8..12]),
                }
            }
            SET_RINGER => {
                need(body, 4)?;
                Message::SetRinger { mode: decode_u32_le(&body[0..4]) }
            }
            SET_SPEAKER_MODE => {
                need(body, 4)?;
                Message::SetSpeakerMode { mode: decode_u32_le(&body[0..4]) }
            }
            START_TONE => {
                need(body, 12)?;
                Message::StartTone {
                    tone: decode_u32_le(&body[0..4]),
                    line_instance: decode_u32_le(&body[4..8]),
                    call_id: decode_u32_le(&body[8..12]),
                }
            }
            STOP_TONE => {
                need(body, 8)?;
                Message::StopTone { line_instance: decode_u32_le(&body[0..4]), call_id: decode_u32_le(&body[4..8]) }
            }
            SELECT_SOFT_KEYS => {
                need(body, 12)?;
                Message::SelectSoftKeys {
                    line_instance: decode_u32_le(&body[0..4]),
                    call_id: decode_u32_le(&body[4..8]),
                    softkey_set: decode_u32_le(&body[8..12]),
                }
            }
            ACTIVATE_CALL_PLANE => {
                need(body, 4)?;
                Message::ActivateCallPlane { line_instance: decode_u32_le(&body[0..4]) }
            }
            RESET => {
                need(body, 4)?;
                Message::Reset { hard: decode_u32_le(&body[0..4]) != 0 }
            }
            other => return Err(Error::UnknownMessageId(other)),
        })
    }
}
