//! loom-proto: wire protocol shared by the loom daemon and its clients.
//!
//! Every message on the socket is a fixed 5-byte header followed by the
//! payload:
//!
//! ```text
//! [type: u8] [length: u32 BE] [payload: length bytes]
//! ```
//!
//! Payloads are raw terminal bytes, so framing is strictly length-prefixed and
//! never delimiter-based. The codec knows nothing about message semantics; the
//! [`payload`] module holds the few structured payload formats.
//!
//! # Architecture
//!
//! - [`MessageKind`] / [`Message`] - the closed set of message types.
//! - [`encode`] / [`decode`] - slice-level framing.
//! - [`MessageCodec`] - `tokio_util` codec for `FramedRead`/`FramedWrite`.

pub mod codec;
pub mod payload;

pub use codec::{
    decode, encode, FramingError, Message, MessageCodec, MessageKind, DEFAULT_MAX_FRAME_LEN,
    HEADER_LEN,
};
pub use payload::{parse_pane_id, split_pane_output, DecodeError, PaneId, PaneSize};
