use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};

use crate::DownloaderConfig;

/// Size of one copy step from a segment response into the output sink.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub transfer_config: HlsTransferConfig,
    pub request_headers: RequestHeaders,
}

// --- Transfer Configuration ---
#[derive(Debug, Clone)]
pub struct HlsTransferConfig {
    /// Bytes copied from the response into the sink per step.
    pub chunk_size: usize,
    /// Progress is re-published at this interval even when no bytes arrive.
    pub progress_interval: Duration,
    /// Fails the transfer when a segment response delivers no bytes for this long.
    /// `None` waits forever.
    pub segment_stall_timeout: Option<Duration>,
}

impl Default for HlsTransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: Duration::from_secs(1),
            segment_stall_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Header overrides forwarded from the context that triggered a download.
///
/// Only `Referer` and `User-Agent` are forwarded, and only when set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestHeaders {
    pub fn new(referer: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            referer: referer.filter(|v| !v.is_empty()),
            user_agent: user_agent.filter(|v| !v.is_empty()),
        }
    }

    /// Headers to set on each manifest and segment request.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(referer) = self.referer.as_deref() {
            match HeaderValue::from_str(referer) {
                Ok(value) => {
                    headers.insert(REFERER, value);
                }
                Err(_) => tracing::warn!(referer, "Ignoring invalid Referer header"),
            }
        }
        if let Some(user_agent) = self.user_agent.as_deref() {
            match HeaderValue::from_str(user_agent) {
                Ok(value) => {
                    headers.insert(USER_AGENT, value);
                }
                Err(_) => tracing::warn!(user_agent, "Ignoring invalid User-Agent header"),
            }
        }
        headers
    }
}
