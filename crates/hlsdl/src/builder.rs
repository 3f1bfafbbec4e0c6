//! Fluent construction of the HTTP client settings.
//!
//! ```
//! use std::time::Duration;
//! use hlsdl_engine::{DownloaderConfig, ProxyConfig, ProxyType};
//!
//! let config = DownloaderConfig::builder()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_header("Origin", "https://player.example.com")
//!     .with_proxy(ProxyConfig {
//!         url: "127.0.0.1:1080".to_string(),
//!         proxy_type: ProxyType::Socks5,
//!         auth: None,
//!     })
//!     .build();
//! assert!(!config.use_system_proxy);
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::{DownloaderConfig, proxy::ProxyConfig};

/// Fluent construction of a [`DownloaderConfig`], starting from its defaults.
#[derive(Debug, Clone, Default)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit on a whole request; zero means none, so long segments never hit it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sends `name: value` with every request. Headers that don't parse are dropped.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let (name, value) = (name.as_ref(), value.as_ref());
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(header_name), Ok(header_value)) => {
                self.config.headers.insert(header_name, header_value);
            }
            _ => warn!(header = name, "Skipping invalid header"),
        }
        self
    }

    /// Replaces every header, defaults included.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Routes all requests through `proxy`; the system proxy is then ignored.
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false;
        self
    }

    /// Has no effect once an explicit proxy is set.
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.config.use_system_proxy = use_system_proxy && self.config.proxy.is_none();
        self
    }

    /// Skips TLS certificate checks. Only for servers you control.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.danger_accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}
