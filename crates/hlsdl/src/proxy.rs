//! Explicit proxy settings for manifest and segment requests.

use std::str::FromStr;

use reqwest::Proxy;

use crate::DownloadError;

/// Which requests go through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub enum ProxyType {
    Http,
    Https,
    /// `socks5://` is added when the URL has no scheme
    Socks5,
    #[default]
    All,
}

impl FromStr for ProxyType {
    type Err = DownloadError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks5" => Ok(ProxyType::Socks5),
            "all" => Ok(ProxyType::All),
            _ => Err(DownloadError::ProxyError(format!(
                "Invalid proxy type: '{kind}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// e.g. `http://proxy.example.com:8080`
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// The reqwest proxy for these settings.
    pub fn to_proxy(&self) -> Result<Proxy, DownloadError> {
        let invalid = |e: reqwest::Error| {
            DownloadError::ProxyError(format!(
                "Invalid {:?} proxy URL '{}': {e}",
                self.proxy_type, self.url
            ))
        };
        let proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&self.url),
            ProxyType::Https => Proxy::https(&self.url),
            ProxyType::Socks5 if self.url.contains("://") => Proxy::all(&self.url),
            ProxyType::Socks5 => Proxy::all(format!("socks5://{}", self.url)),
            ProxyType::All => Proxy::all(&self.url),
        }
        .map_err(invalid)?;

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}
