//! loom-pty: shell processes on pseudo-terminals, one per pane.
//!
//! # Architecture
//!
//! - [`PtyHandle`] - Low-level PTY process management (spawn, write, resize, kill).
//! - [`Pane`] - A `PtyHandle` plus a dedicated reader thread that pushes raw
//!   output chunks into a bounded queue.
//! - [`PaneSet`] - The ordered pane collection of a session, its active index
//!   and its id allocator.

pub mod pane;
pub mod pane_set;
pub mod pty;

pub use pane::{Pane, PaneOutput, DEFAULT_OUTPUT_QUEUE};
pub use pane_set::PaneSet;
pub use pty::{PaneCommand, PtyError, PtyHandle};
