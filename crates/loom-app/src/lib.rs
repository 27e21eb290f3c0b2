//! loom: a terminal multiplexer built around one shared session.
//!
//! # Architecture
//!
//! - **Daemon** ([`daemon`]) - Owns the [`daemon::session::Session`]: the
//!   panes, the active pane and the attached clients. Listens on a Unix socket
//!   and serves each connection with its own read loop and writer task.
//! - **Client** ([`client`]) - Mirrors the session locally (one emulator per
//!   pane), paints it with crossterm and forwards the keyboard.
//! - [`config`] - TOML configuration shared by both sides.
//!
//! Daemon and client speak the length-prefixed protocol from `loom-proto`.

pub mod client;
pub mod config;
pub mod daemon;
