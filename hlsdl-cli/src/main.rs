use clap::Parser;
use error::AppError;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod download;
mod error;
mod utils;

use cli::CliArgs;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Logs go to stderr: stdout may carry the media stream
    let log_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    debug!(url = ?args.url, output = ?args.output, "Parsed arguments");

    if args.dry_run {
        let url = args.url.as_deref().ok_or_else(|| {
            AppError::InvalidInput("--dry-run needs a manifest URL".to_string())
        })?;
        return download::list_segments(&args, url, &mut std::io::stdout().lock()).await;
    }

    let request = download::resolve_request(&args).await?;
    download::run_download(&args, request).await
}
