//! Byte-order primitives and frame reader/writer for the SCCP wire
//! format:
//!
//! ```text
//! [len:u32 LE][reserved:u32 LE = 0][id:u32 LE][body: len-4 bytes]
//! ```
//!
//! `len` counts the bytes that follow the length field's own reserved
//! word — i.e. `id` plus `body`. The reader validates `len` before
//! allocating anything for the body (spec.md §3, §4.1).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Total frame size budget (header + reserved + id + body).
pub const MAX_FRAME_SIZE: usize = 2000;

/// Upper bound on the wire `len` field (id + body).
pub const MAX_LEN: u32 = (MAX_FRAME_SIZE - 4) as u32;

/// Lower bound on the wire `len` field — an empty body still carries `id`.
pub const MIN_LEN: u32 = 4;

/// Upper bound on the body alone, once `id` is subtracted from `len`.
pub const MAX_PAYLOAD_LEN: u32 = MAX_LEN - 4;

pub fn encode_u32_le(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

pub fn decode_u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

pub fn encode_u16_le(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

pub fn decode_u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

/// A decoded frame: the 32-bit message id and its raw body bytes.
/// The schema layer (`crate::message`) turns this into a `Message`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: u32,
    pub body: Vec<u8>,
}

/// Read one frame from `reader`. Fails with `FrameTooShort` if the
/// peer closes mid-header, `FrameTooLarge` if `len` is out of bounds,
/// `PeerClosed` on a clean EOF before any header bytes arrive.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..]).await.map_err(Error::Read)?;
        if n == 0 {
            return if filled == 0 { Err(Error::PeerClosed) } else { Err(Error::FrameTooShort) };
        }
        filled += n;
    }

    let len = decode_u32_le(&header[0..4]);
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return Err(Error::FrameTooLarge(len));
    }

    let mut rest = vec![0u8; len as usize];
    reader.read_exact(&mut rest).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::FrameTooShort
        } else {
            Error::Read(e)
        }
    })?;

    let id = decode_u32_le(&rest[0..4]);
    let body = rest[4..].to_vec();
    Ok(Frame { id, body })
}

/// Write one frame. Retries partial writes until the whole frame is
/// sent or the socket errors (spec.md §4.1: "one frame = one `write`
/// system call attempt, retrying on partial writes").
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, id: u32, body: &[u8]) -> Result<()> {
    let len = 4 + body.len() as u32;
    if len > MAX_LEN {
        return Err(Error::FrameTooLarge(len));
    }

    let mut buf = Vec::with_capacity(8 + body.len() + 4);
    buf.extend_from_slice(&encode_u32_le(len));
    buf.extend_from_slice(&encode_u32_le(0)); // reserved
    buf.extend_from_slice(&encode_u32_le(id));
    buf.extend_from_slice(body);

    writer.write_all(&buf).await.map_err(Error::Write)?;
    Ok(())
}
