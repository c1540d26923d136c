//! fileshare
//!
//! Serve one directory tree over HTTP.

use std::path::PathBuf;

use clap::Parser;
use fileshare::config::Config;
use fileshare::FileServer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// fileshare - share a directory tree over HTTP.
#[derive(Parser, Debug)]
#[command(name = "fileshare")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory to share
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Host to listen on (empty for all interfaces)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// URL prefix the share is mounted at
    #[arg(long)]
    pub prefix: Option<String>,

    /// Follow symlinks, including ones pointing outside the shared directory
    #[arg(long)]
    pub symlinks: bool,

    /// Hide entries whose name starts with '.'
    #[arg(
        short = 'k',
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub skip_hidden: Option<bool>,

    /// Reject uploads and every mutating call
    #[arg(long)]
    pub ro: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Layer the command line over `config`.
    ///
    /// Switches only ever turn a behavior on; they cannot undo a setting
    /// from the configuration file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.path {
            config.share.root = Some(path.clone());
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(prefix) = &self.prefix {
            config.server.prefix = prefix.clone();
        }
        if let Some(skip_hidden) = self.skip_hidden {
            config.share.skip_hidden = skip_hidden;
        }
        config.share.follow_symlinks |= self.symlinks;
        config.share.read_only |= self.ro;
        config.logging.json |= self.json;
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config) {
    let level = config.logging.level.to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={level},tower_http={level}",
            env!("CARGO_CRATE_NAME")
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolve once SIGINT or SIGTERM arrives.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();
    cli.apply(&mut config);

    init_logging(&config);
    if let Some(config_path) = &cli.config {
        info!("Using config file: {:?}", config_path);
    }

    let settings = config.into_settings()?;
    let server = FileServer::bind(settings).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_token.cancel();
    });

    server.run(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["fileshare"]).unwrap();
        assert!(cli.path.is_none());
        assert!(cli.skip_hidden.is_none());
        assert!(!cli.symlinks);
        assert!(!cli.ro);

        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_full_command_line() {
        let cli = Cli::try_parse_from([
            "fileshare",
            "-H",
            "0.0.0.0",
            "-p",
            "9000",
            "--prefix",
            "share",
            "--symlinks",
            "--ro",
            "--json",
            "-v",
            "/srv/share",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.prefix, "share");
        assert_eq!(config.share.root, Some(PathBuf::from("/srv/share")));
        assert!(config.share.follow_symlinks);
        assert!(config.share.read_only);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_skip_hidden_flag_forms() {
        let cli = Cli::try_parse_from(["fileshare", "-k"]).unwrap();
        assert_eq!(cli.skip_hidden, Some(true));

        let cli = Cli::try_parse_from(["fileshare", "-k", "/srv/share"]).unwrap();
        assert_eq!(cli.skip_hidden, Some(true));
        assert_eq!(cli.path, Some(PathBuf::from("/srv/share")));

        let cli = Cli::try_parse_from(["fileshare", "--skip-hidden=false"]).unwrap();
        assert_eq!(cli.skip_hidden, Some(false));

        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(!config.share.skip_hidden);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["fileshare", "-p", "not-a-port"]).is_err());
        assert!(Cli::try_parse_from(["fileshare", "-p", "70000"]).is_err());
    }
}
