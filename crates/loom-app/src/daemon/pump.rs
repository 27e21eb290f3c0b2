//! Per-pane output pump.
//!
//! Drains one pane's output queue in order and broadcasts each chunk as a
//! `Data` frame. Single reader, single drain task, so bytes from one pane
//! reach every client in the order the shell wrote them.

use loom_proto::{Message, PaneId};
use loom_pty::PaneOutput;
use tokio::task::JoinHandle;

use super::clients::Broadcaster;
use super::events::SessionEvent;

pub fn start_output_pump(
    pane: PaneId,
    mut output: PaneOutput,
    broadcaster: Broadcaster,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = output.recv().await {
            let frame = Message::pane_output(pane, &chunk).to_frame();
            broadcaster.broadcast(&frame);
        }
        broadcaster.emit(SessionEvent::PaneOutputEnded { id: pane });
    })
}
