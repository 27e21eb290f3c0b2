//! Configuration for the daemon and the client.
//!
//! Loaded from TOML at `$LOOM_CONFIG`, else `$XDG_CONFIG_HOME/loom/config.toml`,
//! else `~/.config/loom/config.toml`. A missing file means defaults.
//!
//! ```toml
//! socket_path = "/tmp/loom.sock"
//!
//! [session]
//! name = "work"
//! cols = 120
//! rows = 40
//!
//! [pane]
//! shell = "/bin/bash"
//! term = "dumb"
//!
//! [client]
//! emulator = "alacritty"
//! prefix = "b"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use loom_proto::{PaneSize, DEFAULT_MAX_FRAME_LEN};
use loom_pty::{PaneCommand, DEFAULT_OUTPUT_QUEUE};
use loom_vt::{AlacrittyTerminal, Emulator, GridTerminal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unix socket the daemon listens on.
    pub socket_path: PathBuf,
    /// Directory for `loom-daemon.log` and `loom-client.log`.
    pub log_dir: PathBuf,
    pub session: SessionConfig,
    pub pane: PaneConfig,
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            socket_path: tmp.join("loom.sock"),
            log_dir: tmp,
            session: SessionConfig::default(),
            pane: PaneConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub name: String,
    /// Viewport used before any client has reported its size.
    pub cols: u16,
    pub rows: u16,
    pub max_frame_len: usize,
    /// Frames buffered per attached client before it is dropped.
    pub client_queue: usize,
    /// Output chunks buffered per pane.
    pub pane_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            cols: 80,
            rows: 24,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            client_queue: 4096,
            pane_queue: DEFAULT_OUTPUT_QUEUE,
        }
    }
}

impl SessionConfig {
    /// Initial pane size: the viewport minus the status row.
    pub fn pane_size(&self) -> PaneSize {
        PaneSize::new(self.cols.max(1), self.rows.saturating_sub(1).max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaneConfig {
    /// Shell program; unset falls back to `$SHELL`, then `/bin/sh`.
    pub shell: Option<String>,
    pub args: Vec<String>,
    /// `TERM` exported to shells.
    pub term: String,
    pub env: BTreeMap<String, String>,
}

impl Default for PaneConfig {
    fn default() -> Self {
        Self {
            shell: None,
            args: Vec::new(),
            term: "dumb".to_string(),
            env: BTreeMap::new(),
        }
    }
}

impl PaneConfig {
    pub fn command(&self) -> PaneCommand {
        let mut env = vec![("TERM".to_string(), self.term.clone())];
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        PaneCommand {
            shell: self.shell.clone(),
            args: self.args.clone(),
            env,
        }
    }
}

/// Which terminal emulator the client mirrors panes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmulatorBackend {
    #[default]
    Grid,
    Alacritty,
}

impl EmulatorBackend {
    pub fn build(self, cols: u16, rows: u16) -> Box<dyn Emulator> {
        match self {
            Self::Grid => Box::new(GridTerminal::new(cols, rows)),
            Self::Alacritty => Box::new(AlacrittyTerminal::new(cols, rows)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub emulator: EmulatorBackend,
    /// Letter of the Ctrl+<prefix> command chord.
    pub prefix: char,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    pub connect_backoff_max_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            emulator: EmulatorBackend::Grid,
            prefix: 'a',
            connect_attempts: 20,
            connect_backoff_ms: 50,
            connect_backoff_max_ms: 400,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// `None`, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::config_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Invalid config: {}", path.display()))?
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `LOOM_SOCKET` and `LOOM_LOG_DIR` overrides.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(socket) = var("LOOM_SOCKET").filter(|s| !s.is_empty()) {
            self.socket_path = PathBuf::from(socket);
        }
        if let Some(dir) = var("LOOM_LOG_DIR").filter(|s| !s.is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("LOOM_CONFIG") {
            return Some(PathBuf::from(path));
        }
        if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            if !dir.is_empty() {
                return Some(PathBuf::from(dir).join("loom").join("config.toml"));
            }
        }
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config").join("loom").join("config.toml"))
    }
}
