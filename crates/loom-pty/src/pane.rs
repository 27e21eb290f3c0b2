//! A pane: one shell on a PTY plus the dedicated OS thread reading it.
//!
//! PTY reads are blocking, so each pane gets its own reader thread. The
//! thread owns the PTY reader directly and pushes chunks into a bounded
//! channel; it never touches session state, so a busy shell cannot stall
//! structural operations on the session.

use std::io::{self, Read};

use loom_proto::{PaneId, PaneSize};
use tokio::sync::mpsc;

use crate::pty::{PaneCommand, PtyError, PtyHandle};

/// Default capacity of a pane's output queue, in chunks.
pub const DEFAULT_OUTPUT_QUEUE: usize = 1024;

const READ_CHUNK: usize = 4096;

/// Receiving end of a pane's output queue. Yields `None` once the shell has
/// exited and every buffered chunk has been drained.
pub type PaneOutput = mpsc::Receiver<Vec<u8>>;

pub struct Pane {
    id: PaneId,
    pty: PtyHandle,
    output: Option<PaneOutput>,
    size: PaneSize,
}

impl Pane {
    /// Spawn `command` on a new PTY and start its reader thread.
    pub fn spawn(
        id: PaneId,
        command: &PaneCommand,
        size: PaneSize,
        queue_depth: usize,
    ) -> Result<Self, PtyError> {
        let mut pty = PtyHandle::spawn(command, size)?;
        let reader = pty
            .take_reader()
            .ok_or_else(|| PtyError::Spawn("PTY reader already taken".to_string()))?;

        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        std::thread::Builder::new()
            .name(format!("pane-io-{id}"))
            .spawn(move || read_loop(id, reader, tx))?;

        log::debug!("pane {id} spawned {} at {}x{}", command.program(), size.cols, size.rows);

        Ok(Self {
            id,
            pty,
            output: Some(rx),
            size,
        })
    }

    pub fn id(&self) -> PaneId {
        self.id
    }

    pub fn size(&self) -> PaneSize {
        self.size
    }

    /// Hand the output queue to its drain task. Only the first call returns it.
    pub fn take_output(&mut self) -> Option<PaneOutput> {
        self.output.take()
    }

    /// Forward input bytes to the shell. Fails once the shell has exited.
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if !self.pty.is_alive() {
            return Err(PtyError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("pane {} has exited", self.id),
            )));
        }
        self.pty.write(data)
    }

    pub fn resize(&mut self, size: PaneSize) -> Result<(), PtyError> {
        self.pty.resize(size)?;
        self.size = size;
        Ok(())
    }

    pub fn kill(&mut self) -> Result<(), PtyError> {
        self.pty.kill()
    }

    pub fn is_alive(&mut self) -> bool {
        self.pty.is_alive()
    }

    pub fn exit_code(&mut self) -> Option<u32> {
        self.pty.try_wait()
    }
}

fn read_loop(id: PaneId, mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // EIO once the slave side closes; the shell is gone either way.
            Err(e) => {
                log::debug!("pane {id} read ended: {e}");
                break;
            }
        };

        // Blocks while the queue is full, which back-pressures the shell.
        if tx.blocking_send(buf[..n].to_vec()).is_err() {
            break;
        }
    }

    log::debug!("pane {id} reader thread exiting");
}
