//! Structured payload formats carried inside frames.
//!
//! - Daemon→client `Data`: 4-byte big-endian pane id, then raw output bytes.
//! - `Resize`: JSON object `{"rows": R, "cols": C}`.
//! - `NewPaneNotify` / `SwitchPaneNotify`: a bare JSON integer pane id.

use serde::{Deserialize, Serialize};

/// Pane identifier, unique within a session and never reused.
pub type PaneId = u32;

/// Errors from interpreting a frame's payload.
///
/// These never invalidate the connection: the receiver drops the one
/// message and keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload too short: {len} bytes, need at least {min}")]
    ShortPayload { len: usize, min: usize },
}

/// Terminal size of a pane, in character cells.
///
/// Accepts the capitalised `Rows`/`Cols` field names emitted by older
/// clients that serialised a raw winsize struct.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaneSize {
    #[serde(alias = "Rows")]
    pub rows: u16,
    #[serde(alias = "Cols")]
    pub cols: u16,
}

impl PaneSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { rows, cols }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("PaneSize serialization cannot fail")
    }
}

/// Split a daemon→client `Data` payload into pane id and output bytes.
pub fn split_pane_output(payload: &[u8]) -> Result<(PaneId, &[u8]), DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::ShortPayload {
            len: payload.len(),
            min: 4,
        });
    }
    let id = PaneId::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Ok((id, &payload[4..]))
}

pub fn parse_pane_id(payload: &[u8]) -> Result<PaneId, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

pub(crate) fn encode_pane_id(id: PaneId) -> Vec<u8> {
    serde_json::to_vec(&id).expect("integer serialization cannot fail")
}
