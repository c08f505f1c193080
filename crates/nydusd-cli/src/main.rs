#![deny(unsafe_code)]

//! `nydusctl`: operator front-end for a running nydusd.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nydusd_client::{DaemonControl, NydusdClient};
use nydusd_config::ClientConfig;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Query and control a nydusd instance over its API socket.
#[derive(Parser)]
#[command(name = "nydusctl", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "nydusctl.toml")]
    config: PathBuf,

    /// Daemon API socket, overriding the configured one.
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon identity, version, and state.
    Status,

    /// Mount a RAFS instance in a shared daemon.
    Mount {
        /// Mountpoint inside the daemon.
        #[arg(long)]
        mountpoint: String,

        /// Bootstrap file of the image.
        #[arg(long)]
        bootstrap: String,

        /// Daemon config file; defaults to `daemon.config_path`.
        #[arg(long)]
        daemon_config: Option<PathBuf>,
    },

    /// Unmount a RAFS instance.
    Umount {
        #[arg(long)]
        mountpoint: String,
    },

    /// Bind an fscache blob.
    Bind {
        #[arg(long)]
        daemon_config: Option<PathBuf>,
    },

    /// Unbind the fscache blobs of a domain.
    Unbind {
        #[arg(long)]
        daemon_config: Option<PathBuf>,
    },

    /// Print filesystem metrics.
    Metrics {
        /// Mount id; required when the daemon runs in shared mode.
        #[arg(long)]
        sid: Option<String>,
    },

    /// Wait until the daemon socket is ready, then exit.
    Wait,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Print client build information.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config).await?;
    if let Some(socket) = &cli.socket {
        config.daemon.socket_path = socket.clone();
    }

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config { show } => return cmd_config(&cli.config, &config, show),
        Commands::Version => {
            println!("nydusctl {}", nydusd_client::build_info::version_string());
            return Ok(());
        }
        Commands::Wait => return cmd_wait(&config).await,
        _ => {}
    }

    let client = NydusdClient::from_config(&config)
        .await
        .context("failed to build transport for nydus client")?;
    let output = run(&client, &config, cli.command).await?;
    println!("{output}");
    Ok(())
}

/// Execute a daemon command and render its result.
async fn run(
    client: &dyn DaemonControl,
    config: &ClientConfig,
    command: Commands,
) -> Result<String> {
    match command {
        Commands::Status => {
            let status = client.check_status().await?;
            to_json(&status)
        }
        Commands::Mount {
            mountpoint,
            bootstrap,
            daemon_config,
        } => {
            let daemon_config = resolve_daemon_config(config, daemon_config)?;
            client
                .shared_mount(&mountpoint, &bootstrap, &daemon_config)
                .await?;
            info!(%mountpoint, "mounted");
            Ok(format!("mounted {bootstrap} at {mountpoint}"))
        }
        Commands::Umount { mountpoint } => {
            client.umount(&mountpoint).await?;
            Ok(format!("unmounted {mountpoint}"))
        }
        Commands::Bind { daemon_config } => {
            require_fscache(config)?;
            let daemon_config = resolve_daemon_config(config, daemon_config)?;
            client.fscache_bind_blob(&daemon_config).await?;
            Ok(format!("bound blob from {}", daemon_config.display()))
        }
        Commands::Unbind { daemon_config } => {
            require_fscache(config)?;
            let daemon_config = resolve_daemon_config(config, daemon_config)?;
            client.fscache_unbind_blob(&daemon_config).await?;
            Ok(format!("unbound blobs from {}", daemon_config.display()))
        }
        Commands::Metrics { sid } => {
            let shared = config.daemon.is_shared();
            let sid = match (shared, sid) {
                (true, None) => bail!("--sid is required when daemon.mode is \"shared\""),
                (_, sid) => sid.unwrap_or_default(),
            };
            let metric = client.get_fs_metric(shared, &sid).await?;
            to_json(&metric)
        }
        Commands::Wait | Commands::Config { .. } | Commands::Version => {
            bail!("command does not talk to the daemon")
        }
    }
}

async fn cmd_wait(config: &ClientConfig) -> Result<()> {
    let socket = &config.daemon.socket_path;
    nydusd_client::wait_until_socket_exists(socket, &config.readiness)
        .await
        .with_context(|| format!("daemon socket {} never became ready", socket.display()))?;
    println!("{} is ready", socket.display());
    Ok(())
}

fn cmd_config(config_path: &Path, config: &ClientConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

fn resolve_daemon_config(config: &ClientConfig, explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit
        .or_else(|| config.daemon.config_path.clone())
        .context("no daemon config given: pass --daemon-config or set daemon.config_path")
}

fn require_fscache(config: &ClientConfig) -> Result<()> {
    if !config.daemon.is_fscache() {
        bail!(
            "blob commands need daemon.fs_driver = \"fscache\", got {:?}",
            config.daemon.fs_driver
        );
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to render response")
}

async fn load_config(path: &Path) -> Result<ClientConfig> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        ClientConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(ClientConfig::default())
    }
}
