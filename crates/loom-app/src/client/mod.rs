//! The interactive client: connects to the daemon, mirrors its panes and
//! forwards the keyboard.

pub mod keymap;
pub mod render;
pub mod state;

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use futures_util::{SinkExt, StreamExt};
use loom_proto::{Message, MessageCodec, PaneSize};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use self::keymap::{KeyAction, Keymap};
use self::render::Renderer;
use self::state::{ClientState, Repaint};
use crate::config::{ClientConfig, Config};

/// Connect to the daemon, starting one in the background if none answers.
pub async fn connect(config: &Config, config_path: Option<&Path>) -> Result<UnixStream> {
    if let Ok(stream) = UnixStream::connect(&config.socket_path).await {
        return Ok(stream);
    }

    spawn_daemon(config, config_path)?;
    connect_with_backoff(&config.socket_path, &config.client).await
}

/// Retry `connect` with exponential backoff, giving up after
/// `connect_attempts` tries.
pub async fn connect_with_backoff(socket: &Path, client: &ClientConfig) -> Result<UnixStream> {
    let mut delay = Duration::from_millis(client.connect_backoff_ms.max(1));
    let cap = Duration::from_millis(client.connect_backoff_max_ms.max(1));
    let mut last_error = None;

    for attempt in 1..=client.connect_attempts.max(1) {
        tokio::time::sleep(delay).await;
        match UnixStream::connect(socket).await {
            Ok(stream) => {
                log::info!("connected to {} on attempt {attempt}", socket.display());
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
        delay = (delay * 2).min(cap);
    }

    let error = last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound));
    Err(error).with_context(|| format!("No daemon answered on {}", socket.display()))
}

fn spawn_daemon(config: &Config, config_path: Option<&Path>) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Failed to locate the loom executable")?;
    let mut command = Command::new(exe);
    command.arg("daemon").arg("--socket").arg(&config.socket_path);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    // Own process group, so the terminal's Ctrl-C never reaches the daemon.
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);

    let child = command.spawn().context("Failed to start the daemon")?;
    log::info!("started daemon (pid {})", child.id());
    Ok(())
}

/// Puts the terminal in raw mode on the alternate screen until dropped.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        execute!(io::stdout(), EnterAlternateScreen).context("Failed to enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Leave raw mode and the alternate screen. Safe to call more than once.
pub fn restore_terminal() {
    let _ = terminal::disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
}

/// Run the interactive client until detach or until the daemon goes away.
pub async fn run(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let stream = connect(config, config_path).await?;
    let (read_half, write_half) = stream.into_split();
    let max_frame_len = config.session.max_frame_len;
    let mut frames = FramedRead::new(read_half, MessageCodec::new(max_frame_len));
    let mut sink = FramedWrite::new(write_half, MessageCodec::new(max_frame_len));

    let _guard = TerminalGuard::enter()?;
    let (mut width, mut height) = terminal::size().context("Failed to read terminal size")?;
    let mut state = ClientState::new(
        config.client.emulator,
        width,
        height.saturating_sub(1).max(1),
    );
    let mut keymap = Keymap::new(config.client.prefix);
    let mut renderer = Renderer::new(io::stdout());
    let mut events = spawn_input_thread()?;

    sink.send(Message::resize(viewport(width, height))).await?;

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(message)) => match state.handle(&message) {
                    Ok(Repaint::Screen) => renderer.paint(&state, width, height)?,
                    Ok(Repaint::Skip) => {}
                    Err(e) => log::debug!("dropping malformed {:?}: {e}", message.kind),
                },
                Some(Err(e)) => {
                    log::error!("connection to daemon failed: {e}");
                    break;
                }
                None => {
                    log::info!("daemon closed the connection");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(Event::Key(key)) => match keymap.handle_key(key) {
                    KeyAction::Input(bytes) => sink.send(Message::input(bytes)).await?,
                    KeyAction::Command(kind) => sink.send(Message::command(kind)).await?,
                    KeyAction::Detach => {
                        log::info!("detached");
                        break;
                    }
                    KeyAction::None => {}
                },
                Some(Event::Resize(cols, rows)) => {
                    width = cols;
                    height = rows;
                    let size = viewport(width, height);
                    state.set_viewport(size.cols, size.rows);
                    sink.send(Message::resize(size)).await?;
                    renderer.paint(&state, width, height)?;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    Ok(())
}

/// Pane area for a terminal of `width` x `height`: one row goes to status.
fn viewport(width: u16, height: u16) -> PaneSize {
    PaneSize::new(width.max(1), height.saturating_sub(1).max(1))
}

/// crossterm's event reads block, so they run on their own thread.
fn spawn_input_thread() -> Result<mpsc::Receiver<Event>> {
    let (tx, rx) = mpsc::channel(256);
    std::thread::Builder::new()
        .name("loom-input".to_string())
        .spawn(move || loop {
            match event::read() {
                Ok(event) => {
                    if tx.blocking_send(event).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    log::error!("terminal input failed: {e}");
                    return;
                }
            }
        })
        .context("Failed to start the input thread")?;
    Ok(rx)
}
