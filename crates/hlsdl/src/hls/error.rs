use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Errors produced by the manifest parser and the download coordinator.
///
/// The type is `Clone` so that a terminal parser error can be handed to the
/// consumer any number of times.
#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsDownloaderError {
    #[error("No #EXTM3U found")]
    MissingHeader,
    #[error("No segments found")]
    NoSegments,
    #[error("Cannot resolve segment URL (base url: '{base_url}', segment uri: '{segment_uri}')")]
    Resolution {
        base_url: String,
        segment_uri: String,
    },
    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("Network error: {source}")]
    NetworkError {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("already started")]
    AlreadyStarted,
    #[error("No data received for {0:?}")]
    Timeout(Duration),
    #[error("Operation cancelled")]
    Cancelled,
}

impl HlsDownloaderError {
    /// True for errors caused by the manifest document itself.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::MissingHeader | Self::NoSegments)
    }

    /// True for errors raised while talking to the network or the output sink.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::IoError { .. } | Self::HttpStatus { .. } | Self::Timeout(_)
        )
    }
}

// Manual implementation of From<reqwest::Error> for HlsDownloaderError
// because of the Arc wrapping.
impl From<reqwest::Error> for HlsDownloaderError {
    fn from(err: reqwest::Error) -> Self {
        HlsDownloaderError::NetworkError {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for HlsDownloaderError {
    fn from(err: std::io::Error) -> Self {
        HlsDownloaderError::IoError {
            source: Arc::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(HlsDownloaderError::MissingHeader.is_format_error());
        assert!(HlsDownloaderError::NoSegments.is_format_error());
        assert!(!HlsDownloaderError::AlreadyStarted.is_format_error());

        let status = HlsDownloaderError::HttpStatus {
            url: "http://h/a.ts".to_string(),
            status: StatusCode::NOT_FOUND,
        };
        assert!(status.is_transport_error());
        assert_eq!(status.to_string(), "http://h/a.ts returned HTTP 404 Not Found");

        let io: HlsDownloaderError = std::io::Error::other("broken pipe").into();
        assert!(io.is_transport_error());
        assert!(!HlsDownloaderError::Cancelled.is_transport_error());
    }
}
