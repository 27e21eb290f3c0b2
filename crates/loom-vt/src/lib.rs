//! loom-vt: terminal emulation for loom panes.
//!
//! Turns the raw byte stream a shell writes to its PTY into an addressable
//! character grid plus cursor position.
//!
//! Two interchangeable strategies implement [`Emulator`]:
//!
//! - [`GridTerminal`] - small built-in state machine covering plain shell
//!   output (printable text, CR/LF, backspace, cursor home, clear screen,
//!   and skipping of style and OSC sequences).
//! - [`AlacrittyTerminal`] - delegates to `alacritty_terminal` for full
//!   VT/xterm coverage.

pub mod alacritty;
pub mod emulator;
pub mod grid;

pub use alacritty::AlacrittyTerminal;
pub use emulator::{Cursor, Emulator};
pub use grid::GridTerminal;
