use hlsdl_engine::DownloadError;
use hlsdl_engine::hls::HlsDownloaderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("{0}")]
    Hls(#[from] HlsDownloaderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}
