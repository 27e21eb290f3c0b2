//! The daemon: one session shared by every client on a Unix socket.

pub mod clients;
pub mod connection;
pub mod events;
pub mod pump;
pub mod session;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UnixListener;

use self::connection::{serve_connection, ConnectionLimits};
use self::events::{LogObserver, SessionObserver};
use self::session::{Session, SessionSettings};
use crate::config::Config;

// sun_path is 104 bytes on macOS and 108 on Linux.
const MAX_SOCKET_PATH: usize = 104;

pub struct Daemon {
    listener: UnixListener,
    socket_path: PathBuf,
    session: Arc<Session>,
    limits: ConnectionLimits,
}

impl Daemon {
    /// Bind the socket and start the session with its first pane.
    ///
    /// Removes any stale socket file and restricts the new one to the owner.
    /// Must be called within a tokio runtime.
    pub fn bind(config: &Config) -> Result<Self> {
        Self::bind_with_observer(config, Arc::new(LogObserver))
    }

    pub fn bind_with_observer(config: &Config, observer: Arc<dyn SessionObserver>) -> Result<Self> {
        let socket_path = config.socket_path.clone();
        let path_len = socket_path.as_os_str().len();
        if path_len >= MAX_SOCKET_PATH {
            anyhow::bail!(
                "Socket path too long ({path_len} bytes, max {}): {}",
                MAX_SOCKET_PATH - 1,
                socket_path.display()
            );
        }

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("Failed to remove stale socket: {}", socket_path.display())
            })?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&socket_path, perms)?;
        }

        let session = Arc::new(Session::new(SessionSettings::from_config(config), observer));
        session
            .create_pane()
            .context("Failed to spawn the initial pane")?;

        log::info!(
            "session {:?} listening on {}",
            session.name(),
            socket_path.display()
        );

        Ok(Self {
            listener,
            socket_path,
            session,
            limits: ConnectionLimits::from(&config.session),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Accept clients until the listener fails or Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept clients until the listener fails or `shutdown` completes, then
    /// close the session and remove the socket file.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        let result: Result<()> = loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        tokio::spawn(serve_connection(stream, self.session.clone(), self.limits));
                    }
                    Err(e) => break Err(e).context("Accept failed"),
                },
                () = &mut shutdown => {
                    log::info!("shutting down");
                    break Ok(());
                }
            }
        };

        self.session.close();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            log::debug!("failed to remove {}: {e}", self.socket_path.display());
        }
        result
    }
}
