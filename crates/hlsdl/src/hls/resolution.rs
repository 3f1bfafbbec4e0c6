// Segment URL resolution relative to the manifest location.

use url::Url;

use super::HlsDownloaderError;

fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    }
}

/// Directory part of a URL path: `/a/b/x.m3u8` -> `/a/b`, `/x.m3u8` -> `/`.
fn path_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Base URL of a manifest: scheme, host and the directory of its path.
/// Query and fragment are dropped.
pub fn base_url(manifest_url: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(manifest_url)?;
    Ok(format!("{}{}", authority(&url), path_dir(url.path())))
}

/// Resolves a segment URI against a manifest base URL.
///
/// Root-relative URIs keep only the scheme and host of the base; full
/// `http(s)://` URIs are returned as they are; anything else is appended to
/// the base directory.
pub fn segment_url(base_url: &str, segment_uri: &str) -> Result<String, HlsDownloaderError> {
    let resolution_error = || HlsDownloaderError::Resolution {
        base_url: base_url.to_string(),
        segment_uri: segment_uri.to_string(),
    };

    if base_url.is_empty() || segment_uri.is_empty() {
        return Err(resolution_error());
    }

    if segment_uri.starts_with('/') {
        let base = Url::parse(base_url).map_err(|_| resolution_error())?;
        return Ok(format!("{}{segment_uri}", authority(&base)));
    }

    if let Ok(absolute) = Url::parse(segment_uri) {
        if matches!(absolute.scheme(), "http" | "https") {
            return Ok(segment_uri.to_string());
        }
    }

    Ok(format!("{}/{segment_uri}", base_url.trim_end_matches('/')))
}
