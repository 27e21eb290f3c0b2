//! Per-client connection handler.
//!
//! Each accepted stream gets a writer task draining its frame queue and a
//! read loop that decodes one message at a time and dispatches it to the
//! session. A framing error or stream end detaches the client.

use std::sync::Arc;

use futures_util::StreamExt;
use loom_proto::{Message, MessageCodec, MessageKind, PaneSize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use super::clients::{write_loop, ClientId};
use super::session::Session;
use crate::config::SessionConfig;

#[derive(Clone, Copy, Debug)]
pub struct ConnectionLimits {
    /// Frames buffered for a client before it is dropped.
    pub client_queue: usize,
    pub max_frame_len: usize,
}

impl From<&SessionConfig> for ConnectionLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            client_queue: config.client_queue.max(1),
            max_frame_len: config.max_frame_len,
        }
    }
}

pub async fn serve_connection<S>(stream: S, session: Arc<Session>, limits: ConnectionLimits)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (frame_tx, frame_rx) = mpsc::channel(limits.client_queue);

    let Some(client) = session.attach(frame_tx) else {
        log::warn!(
            "refusing connection: attach sync exceeds a queue of {}",
            limits.client_queue
        );
        return;
    };
    tokio::spawn(write_loop(client, write_half, frame_rx));
    log::info!("client {client} connected");

    let mut frames = FramedRead::new(read_half, MessageCodec::new(limits.max_frame_len));
    while let Some(result) = frames.next().await {
        match result {
            Ok(message) => dispatch(&session, client, message),
            Err(e) => {
                log::warn!("client {client} framing error: {e}");
                break;
            }
        }
    }

    // Dropping the queued sender lets the writer drain and exit.
    session.detach(client);
    log::info!("client {client} disconnected");
}

fn dispatch(session: &Session, client: ClientId, message: Message) {
    match message.kind {
        MessageKind::Data => {
            session.write_active(&message.payload);
        }
        MessageKind::Resize => match PaneSize::parse(&message.payload) {
            Ok(size) => session.resize(size),
            Err(e) => log::debug!("client {client} sent a malformed resize: {e}"),
        },
        MessageKind::NewPane | MessageKind::Split => {
            if let Err(e) = session.create_pane() {
                log::error!("failed to create pane for client {client}: {e}");
            }
        }
        MessageKind::NextPane | MessageKind::NextPaneAlt => {
            session.switch_active(1);
        }
        MessageKind::PrevPane => {
            session.switch_active(-1);
        }
        MessageKind::KillPane => {
            if let Err(e) = session.kill_active() {
                log::error!("failed to replace killed pane for client {client}: {e}");
            }
        }
        MessageKind::ShowHelp => {
            session.send_help(client);
        }
        MessageKind::Redraw
        | MessageKind::NewPaneNotify
        | MessageKind::SwitchPaneNotify
        | MessageKind::Other(_) => {
            log::debug!("client {client} sent unexpected {:?}", message.kind);
        }
    }
}
