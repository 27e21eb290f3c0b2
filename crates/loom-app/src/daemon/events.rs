//! Diagnostic events emitted by the session.

use log::Level;
use loom_proto::{PaneId, PaneSize};

use super::clients::ClientId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    PaneCreated { id: PaneId },
    PaneRemoved { id: PaneId },
    ActiveChanged { id: PaneId },
    /// The shell exited and its output queue drained.
    PaneOutputEnded { id: PaneId },
    ClientAttached { client: ClientId },
    ClientDetached { client: ClientId },
    /// The client's queue was full or closed during a broadcast.
    ClientDropped { client: ClientId },
    /// Input addressed to a pane that has exited or does not exist.
    InputDropped { id: PaneId, len: usize },
    Resized { size: PaneSize },
}

impl SessionEvent {
    pub fn level(&self) -> Level {
        match self {
            Self::PaneCreated { .. }
            | Self::PaneRemoved { .. }
            | Self::ClientAttached { .. }
            | Self::ClientDetached { .. } => Level::Info,
            Self::ClientDropped { .. } => Level::Warn,
            Self::PaneOutputEnded { .. } | Self::ActiveChanged { .. } | Self::Resized { .. } => {
                Level::Debug
            }
            Self::InputDropped { .. } => Level::Trace,
        }
    }
}

/// Receives every [`SessionEvent`]. Called synchronously, sometimes while the
/// session lock is held, so implementations must not call back into the
/// session.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_event(&self, event: &SessionEvent) {
        log::log!(target: "loom::session", event.level(), "{event:?}");
    }
}
