use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::payload::{PaneId, PaneSize};

/// Size of the fixed frame header: 1 type byte + 4 length bytes.
pub const HEADER_LEN: usize = 5;

/// Default upper bound for a single payload (16 MB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors from frame-level encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("truncated frame: need {expected} bytes, have {available}")]
    Truncated { expected: usize, available: usize },
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message type byte.
///
/// Conversion from `u8` is total: bytes outside the known table decode as
/// [`MessageKind::Other`] so the receiver can skip them without treating the
/// frame as malformed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Client→daemon: input for the active pane. Daemon→client: pane id + output.
    Data,
    /// Client→daemon: new viewport size as JSON `{rows, cols}`.
    Resize,
    NewPane,
    NextPane,
    PrevPane,
    KillPane,
    /// Alias of `NewPane`.
    Split,
    /// Alias of `NextPane`.
    NextPaneAlt,
    /// Daemon→client: UTF-8 status text, possibly multi-line.
    Redraw,
    ShowHelp,
    /// Daemon→client: JSON integer id of a freshly created pane.
    NewPaneNotify,
    /// Daemon→client: JSON integer id of the newly active pane.
    SwitchPaneNotify,
    Other(u8),
}

impl From<u8> for MessageKind {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => MessageKind::Data,
            0x01 => MessageKind::Resize,
            0x02 => MessageKind::NewPane,
            0x03 => MessageKind::NextPane,
            0x04 => MessageKind::PrevPane,
            0x05 => MessageKind::KillPane,
            0x06 => MessageKind::Split,
            0x07 => MessageKind::NextPaneAlt,
            0x08 => MessageKind::Redraw,
            0x09 => MessageKind::ShowHelp,
            0x0A => MessageKind::NewPaneNotify,
            0x0B => MessageKind::SwitchPaneNotify,
            other => MessageKind::Other(other),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Data => 0x00,
            MessageKind::Resize => 0x01,
            MessageKind::NewPane => 0x02,
            MessageKind::NextPane => 0x03,
            MessageKind::PrevPane => 0x04,
            MessageKind::KillPane => 0x05,
            MessageKind::Split => 0x06,
            MessageKind::NextPaneAlt => 0x07,
            MessageKind::Redraw => 0x08,
            MessageKind::ShowHelp => 0x09,
            MessageKind::NewPaneNotify => 0x0A,
            MessageKind::SwitchPaneNotify => 0x0B,
            MessageKind::Other(byte) => byte,
        }
    }
}

/// A single framed message. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Raw keyboard input for the active pane (client → daemon).
    pub fn input(data: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Data, data)
    }

    /// Pane output tagged with its pane id (daemon → client).
    pub fn pane_output(pane: PaneId, data: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(4 + data.len());
        payload.put_u32(pane);
        payload.extend_from_slice(data);
        Self::new(MessageKind::Data, payload.freeze())
    }

    /// A payload-less command such as `NewPane` or `KillPane`.
    pub fn command(kind: MessageKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    pub fn resize(size: PaneSize) -> Self {
        Self::new(MessageKind::Resize, size.to_payload())
    }

    pub fn redraw(status: &str) -> Self {
        Self::new(MessageKind::Redraw, Bytes::copy_from_slice(status.as_bytes()))
    }

    pub fn new_pane_notify(pane: PaneId) -> Self {
        Self::new(MessageKind::NewPaneNotify, crate::payload::encode_pane_id(pane))
    }

    pub fn switch_pane_notify(pane: PaneId) -> Self {
        Self::new(MessageKind::SwitchPaneNotify, crate::payload::encode_pane_id(pane))
    }

    /// Encode into wire format (`[type][len BE][payload]`).
    pub fn encode(&self) -> Vec<u8> {
        encode(self.kind, &self.payload)
    }

    /// Encode into a shareable buffer, for fan-out to many clients.
    pub fn to_frame(&self) -> Bytes {
        Bytes::from(self.encode())
    }
}

/// Encode a frame from a type and payload.
///
/// Callers keep payloads within [`DEFAULT_MAX_FRAME_LEN`]; use
/// [`MessageCodec`] where the size is not known to be bounded.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Vec<u8> {
    debug_assert!(
        payload.len() <= DEFAULT_MAX_FRAME_LEN,
        "frame payload of {} bytes exceeds limit of {DEFAULT_MAX_FRAME_LEN}",
        payload.len()
    );
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(u8::from(kind));
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Decode one frame from the start of `buf`.
///
/// Returns the message and the number of bytes consumed. Fails with
/// [`FramingError::Truncated`] if `buf` does not hold a complete frame, and
/// with [`FramingError::TooLarge`] as soon as the header announces a payload
/// beyond `max_len`.
pub fn decode(buf: &[u8], max_len: usize) -> Result<(Message, usize), FramingError> {
    if buf.len() < HEADER_LEN {
        return Err(FramingError::Truncated {
            expected: HEADER_LEN,
            available: buf.len(),
        });
    }
    let len = payload_len(buf);
    if len > max_len {
        return Err(FramingError::TooLarge { len, max: max_len });
    }
    let total = HEADER_LEN + len;
    if buf.len() < total {
        return Err(FramingError::Truncated {
            expected: total,
            available: buf.len(),
        });
    }
    let message = Message {
        kind: MessageKind::from(buf[0]),
        payload: Bytes::copy_from_slice(&buf[HEADER_LEN..total]),
    };
    Ok((message, total))
}

fn payload_len(header: &[u8]) -> usize {
    u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize
}

/// Streaming codec for use with `tokio_util::codec::{FramedRead, FramedWrite}`.
///
/// A stream that ends in the middle of a frame is reported as a clean end of
/// stream; the partial frame is discarded.
#[derive(Clone, Debug)]
pub struct MessageCodec {
    max_len: usize,
}

impl MessageCodec {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FramingError> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let len = payload_len(&src[..]);
        if len > self.max_len {
            return Err(FramingError::TooLarge {
                len,
                max: self.max_len,
            });
        }

        let total = HEADER_LEN + len;
        if src.len() < total {
            // Size check above bounds this reservation.
            src.reserve(total - src.len());
            return Ok(None);
        }

        let kind = MessageKind::from(src[0]);
        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Message { kind, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FramingError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FramingError> {
        let len = item.payload.len();
        let wire_len = match u32::try_from(len) {
            Ok(wire_len) if len <= self.max_len => wire_len,
            _ => {
                return Err(FramingError::TooLarge {
                    len,
                    max: self.max_len.min(u32::MAX as usize),
                })
            }
        };
        dst.reserve(HEADER_LEN + len);
        dst.put_u8(u8::from(item.kind));
        dst.put_u32(wire_len);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
