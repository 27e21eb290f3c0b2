use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loom_app::config::Config;
use loom_app::daemon::Daemon;

#[derive(Parser)]
#[command(name = "loom")]
#[command(version)]
#[command(about = "Terminal multiplexer with a shared background session")]
struct Cli {
    /// Config file (default: $LOOM_CONFIG or ~/.config/loom/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Socket path, overriding the config file
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session daemon in the foreground
    Daemon,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")?;

    match cli.command {
        Some(Commands::Daemon) => {
            init_logging(&config.log_dir, "loom-daemon.log")?;
            runtime.block_on(run_daemon(&config))
        }
        None => {
            init_logging(&config.log_dir, "loom-client.log")?;
            install_panic_hook();
            runtime.block_on(loom_app::client::run(&config, cli.config.as_deref()))
        }
    }
}

async fn run_daemon(config: &Config) -> Result<()> {
    let daemon = Daemon::bind(config)?;
    daemon.run().await
}

/// Log to a file so output never lands on the terminal the client paints.
fn init_logging(dir: &Path, file_name: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let log_path = dir.join(file_name);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {panic_info}");
        loom_app::client::restore_terminal();
        default_hook(panic_info);
    }));
}
