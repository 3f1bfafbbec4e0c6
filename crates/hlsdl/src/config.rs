use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Settings of the HTTP client shared by manifest and segment requests.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Limit on a whole request, body included. Zero (the default) disables it.
    pub timeout: Duration,

    pub connect_timeout: Duration,

    /// Up to 10 redirects are followed when set.
    pub follow_redirects: bool,

    pub user_agent: String,

    /// Sent with every request.
    pub headers: HeaderMap,

    /// Takes precedence over the system proxy.
    pub proxy: Option<ProxyConfig>,

    pub use_system_proxy: bool,

    pub danger_accept_invalid_certs: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            danger_accept_invalid_certs: false,
        }
    }
}

impl DownloaderConfig {
    pub fn builder() -> crate::builder::DownloaderConfigBuilder {
        crate::builder::DownloaderConfigBuilder::new()
    }

    /// Merges the headers of `config` over the default headers.
    pub fn with_config(config: DownloaderConfig) -> Self {
        let mut headers = DownloaderConfig::get_default_headers();
        for (name, value) in config.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        Self { headers, ..config }
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        // Segments are already compressed media; ask for them as they are.
        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        default_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_config_merges_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("video/mp2t"));
        headers.insert("x-token", HeaderValue::from_static("abc"));

        let config = DownloaderConfig::with_config(DownloaderConfig {
            headers,
            connect_timeout: Duration::from_secs(3),
            ..Default::default()
        });

        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.headers.get(reqwest::header::ACCEPT).unwrap(), "video/mp2t");
        assert_eq!(config.headers.get("x-token").unwrap(), "abc");
        assert_eq!(
            config.headers.get(reqwest::header::CONNECTION).unwrap(),
            "keep-alive"
        );
    }
}
