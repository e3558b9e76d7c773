use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use logview::config::{self, Config, DEFAULT_PORT, DEFAULT_PREVIEW_SIZE_LIMIT};
use logview::server::{self, AppState};
use logview::SourceEncoding;

/// Web viewer for log files
#[derive(Debug, Parser)]
#[command(name = "logview", version, about)]
struct Cli {
    /// Directory with log files (default: ./logs next to the executable)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Largest preview in BYTES; bigger files show only their tail
    #[arg(
        long = "preview-limit",
        default_value_t = DEFAULT_PREVIEW_SIZE_LIMIT,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    preview_limit: u64,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Encoding of the log files: utf-8, windows-1251/cp1251/win1251, koi8-r, iso-8859-1, cp866
    #[arg(long, default_value = "utf-8")]
    encoding: SourceEncoding,
}

fn init_tracing() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing already initialized: {err}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::new()
        .with_log_directory(cli.dir.unwrap_or_else(config::default_log_directory))
        .with_preview_size_limit(cli.preview_limit)
        .with_encoding(cli.encoding)
        .with_port(cli.port)
        .validate()
        .context("invalid configuration")?;

    tracing::info!(version = logview::VERSION, "starting log viewer");
    tracing::info!(path = %config.log_directory.display(), "log directory");
    tracing::info!(
        bytes = config.preview.size_limit,
        "preview limit {:.2} MB",
        config.preview_size_mb()
    );
    tracing::info!(encoding = %config.preview.encoding, "source encoding");
    tracing::info!(port = config.port, "server port");

    config
        .ensure_log_directory()
        .context("failed to prepare log directory")?;

    server::run(AppState::new(config))
        .await
        .context("server error")?;

    Ok(())
}
