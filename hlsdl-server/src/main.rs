use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlsdl_engine::DownloaderConfig;
use hlsdl_engine::hls::HlsTransferConfig;
use hlsdl_engine::output::OverwritePolicy;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod error;
mod server;
mod task;

use server::{AppContext, ServerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "hlsdl-server",
    author,
    version,
    about = "Runs HLS downloads submitted over HTTP and streams their progress"
)]
struct ServerArgs {
    /// Address to listen on
    #[arg(short = 'l', long = "listen", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Directory downloads are written to
    #[arg(short = 'd', long = "output-dir", default_value = ".")]
    output_dir: PathBuf,

    /// What to do when a file with the requested name exists
    #[arg(
        short = 'o',
        long = "overwrite",
        default_value = "uniq",
        value_parser = ["fail", "uniq", "overwrite"]
    )]
    overwrite: String,

    /// Write the raw MPEG-TS stream instead of remuxing through ffmpeg
    #[arg(long = "no-remux")]
    no_remux: bool,

    /// Program used to remux downloads
    #[arg(long = "ffmpeg", default_value = "ffmpeg")]
    ffmpeg: String,

    /// Connection timeout in seconds
    #[arg(long = "connect-timeout", default_value = "10")]
    connect_timeout: u64,

    /// Abort a download when a segment delivers no data for this many seconds (0 disables)
    #[arg(long = "stall-timeout", default_value = "60")]
    stall_timeout: u64,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl ServerArgs {
    fn server_config(&self) -> Result<ServerConfig, AppError> {
        let overwrite: OverwritePolicy = self.overwrite.parse().map_err(AppError::InvalidInput)?;
        Ok(ServerConfig {
            output_dir: self.output_dir.clone(),
            overwrite,
            remux_program: (!self.no_remux).then(|| self.ffmpeg.clone()),
            downloader: DownloaderConfig::builder()
                .with_connect_timeout(Duration::from_secs(self.connect_timeout))
                .build(),
            transfer: HlsTransferConfig {
                segment_stall_timeout: (self.stall_timeout > 0)
                    .then(|| Duration::from_secs(self.stall_timeout)),
                ..Default::default()
            },
        })
    }
}

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Server failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = ServerArgs::parse();

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

    let shutdown = CancellationToken::new();
    let ctx = AppContext::new(args.server_config()?, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(addr = %listener.local_addr()?, output_dir = %args.output_dir.display(), "Listening");

    axum::serve(listener, server::create_router(ctx))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down, cancelling running downloads");
            }
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
