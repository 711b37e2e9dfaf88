//! Crate-wide error type.
//!
//! Mirrors the category split in the design doc: protocol framing
//! errors, registration errors, IO errors, resource errors, and state
//! errors. Host-adapter failures are *not* represented here — callers
//! log those as warnings and continue (see `device` module).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // --- Protocol ---
    #[error("frame too short: expected at least 8 header bytes")]
    FrameTooShort,

    #[error("frame too large: payload length {0} exceeds {max}", max = crate::codec::MAX_PAYLOAD_LEN)]
    FrameTooLarge(u32),

    #[error("unknown message id: {0:#x}")]
    UnknownMessageId(u32),

    #[error("message out of order: {0} received before registration completed")]
    MessageOutOfOrder(&'static str),

    // --- Registration ---
    #[error("unsupported device type: {0}")]
    UnsupportedDeviceType(u32),

    #[error("unknown device name: {0}")]
    UnknownDevice(String),

    #[error("device already registered: {0}")]
    DeviceAlreadyRegistered(String),

    // --- IO ---
    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    // --- Resource ---
    #[error("allocation failed: {0}")]
    AllocationFailed(&'static str),

    // --- State ---
    #[error("no such line instance: {0}")]
    NoSuchLineInstance(u32),

    #[error("no such speeddial instance: {0}")]
    NoSuchSpeeddialInstance(u32),
}
