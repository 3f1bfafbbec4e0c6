//! # hlsdl-engine
//!
//! Downloads an HLS media presentation into a single output.
//!
//! The manifest is parsed while it is still arriving: a parser task hands
//! segments to the [`hls::DownloadCoordinator`] through a [`hls::SegmentSource`],
//! and the coordinator copies each segment into an [`output::OutputSink`] in
//! manifest order, publishing [`hls::TransferSnapshot`]s as it goes.
//!
//! ```no_run
//! use hlsdl_engine::hls::{DownloadCoordinator, HlsConfig};
//! use hlsdl_engine::output::PipeSink;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = DownloadCoordinator::new(HlsConfig::default())?;
//! let (mut progress, handle) = coordinator
//!     .start("https://example.com/live/index.m3u8", Box::new(PipeSink::stdout()))
//!     .await?;
//! while let Some(snapshot) = progress.recv().await {
//!     eprintln!("{} bytes", snapshot.got_bytes);
//! }
//! handle.await??;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod bytes_stream;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod output;
pub mod proxy;

#[cfg(test)]
mod test_utils;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use downloader::create_client;
pub use error::DownloadError;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
