use std::io::{Read, Write};

use loom_proto::PaneSize;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    Spawn(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    Resize(String),
}

/// What to run in a new pane.
#[derive(Clone, Debug, Default)]
pub struct PaneCommand {
    /// Program to run; `None` uses the user's default shell.
    pub shell: Option<String>,
    pub args: Vec<String>,
    /// Extra environment on top of the daemon's own.
    pub env: Vec<(String, String)>,
}

impl PaneCommand {
    pub fn shell(program: impl Into<String>) -> Self {
        Self {
            shell: Some(program.into()),
            ..Self::default()
        }
    }

    /// The program that will actually be executed.
    pub fn program(&self) -> String {
        self.shell.clone().unwrap_or_else(default_shell)
    }

    fn builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(self.program());
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Owns a portable-pty child process, master side, reader, and writer.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyHandle {
    /// Spawn `command` on a fresh PTY of the given size.
    pub fn spawn(command: &PaneCommand, size: PaneSize) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(size))
            .map_err(|e| PtyError::Spawn(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(command.builder())
            .map_err(|e| PtyError::Spawn(format!("failed to spawn {}: {e}", command.program())))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Spawn(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Spawn(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer,
            child,
        })
    }

    pub fn resize(&self, size: PaneSize) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| PtyError::Resize(format!("{e}")))
    }

    /// Write bytes to the PTY master (user input -> shell).
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Hand the blocking output reader to a dedicated thread. Only the first
    /// call returns it.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Terminate the child process.
    pub fn kill(&mut self) -> Result<(), PtyError> {
        if self.try_wait().is_some() {
            return Ok(());
        }
        self.child.kill()?;
        Ok(())
    }

    pub fn is_alive(&mut self) -> bool {
        self.try_wait().is_none()
    }

    /// Get the child process exit status if it has exited.
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            log::debug!("failed to kill pane process on drop: {e}");
        }
    }
}

fn pty_size(size: PaneSize) -> PtySize {
    PtySize {
        rows: size.rows.max(1),
        cols: size.cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}
