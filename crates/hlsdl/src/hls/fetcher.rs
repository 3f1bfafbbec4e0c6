// HTTP requests for manifests and segments, and the chunked copy of a segment
// body into the output sink.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::bytes_stream::BytesStreamReader;
use crate::hls::HlsDownloaderError;
use crate::output::OutputSink;

/// Upper bound of a single read from a segment body.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Issues GET requests with the forwarded header overrides.
#[derive(Debug, Clone)]
pub struct SegmentFetcher {
    http_client: Client,
    headers: HeaderMap,
}

impl SegmentFetcher {
    pub fn new(http_client: Client, headers: HeaderMap) -> Self {
        Self {
            http_client,
            headers,
        }
    }

    async fn get(&self, url: &str) -> Result<Response, HlsDownloaderError> {
        Ok(self
            .http_client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?)
    }

    /// Requests the manifest and returns its body as a stream.
    ///
    /// A non-200 status is only logged; the body is parsed regardless.
    pub async fn fetch_manifest(&self, url: &str) -> Result<BytesStreamReader, HlsDownloaderError> {
        let response = self.get(url).await?;
        if response.status() != StatusCode::OK {
            warn!(url, status = %response.status(), "Manifest request returned a non-OK status");
        } else {
            debug!(url, "Manifest response received");
        }
        Ok(BytesStreamReader::from_response(response))
    }

    /// Requests a segment. Anything but 200 is an error.
    pub async fn open_segment(&self, url: &str) -> Result<SegmentBody, HlsDownloaderError> {
        let response = self.get(url).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(HlsDownloaderError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let size_hint = response.content_length();
        Ok(SegmentBody {
            size_hint,
            reader: BytesStreamReader::from_response(response),
        })
    }
}

/// Streaming body of a segment response.
pub struct SegmentBody {
    /// `Content-Length` of the response, for display only.
    pub size_hint: Option<u64>,
    pub reader: BytesStreamReader,
}

/// Outcome of one chunk copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCopy {
    pub copied: u64,
    pub eof: bool,
}

/// Copies up to `chunk_size` bytes from `reader` into `sink`.
///
/// Stops early at end of input. With `stall_timeout` set, a single read that
/// yields nothing for that long fails with `Timeout`.
pub async fn copy_chunk<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    sink: &mut dyn OutputSink,
    chunk_size: usize,
    stall_timeout: Option<Duration>,
) -> Result<ChunkCopy, HlsDownloaderError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let chunk_size = chunk_size.max(1);
    buf.resize(chunk_size.min(READ_BUFFER_SIZE), 0);

    let mut copied = 0usize;
    while copied < chunk_size {
        let want = buf.len().min(chunk_size - copied);
        let read = reader.read(&mut buf[..want]);
        let n = match stall_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| HlsDownloaderError::Timeout(limit))??,
            None => read.await?,
        };
        if n == 0 {
            return Ok(ChunkCopy {
                copied: copied as u64,
                eof: true,
            });
        }
        sink.write_all(&buf[..n]).await?;
        copied += n;
    }

    Ok(ChunkCopy {
        copied: copied as u64,
        eof: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PipeSink;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn test_copy_chunk_splits_input() {
        let data = vec![7u8; 10];
        let mut reader: &[u8] = &data;
        let (client, _server) = tokio::io::duplex(1024);
        let mut sink = PipeSink::new(Box::new(client));
        let mut buf = Vec::new();

        let first = copy_chunk(&mut reader, &mut buf, &mut sink, 4, None)
            .await
            .unwrap();
        assert_eq!(first, ChunkCopy { copied: 4, eof: false });

        let second = copy_chunk(&mut reader, &mut buf, &mut sink, 100, None)
            .await
            .unwrap();
        assert_eq!(second, ChunkCopy { copied: 6, eof: true });
        assert_eq!(sink.bytes_written(), 10);
    }

    #[tokio::test]
    async fn test_copy_chunk_stall_timeout() {
        // Writer half kept alive and silent.
        let (_writer, mut reader) = tokio::io::duplex(64);
        let (client, _server) = tokio::io::duplex(64);
        let mut sink = PipeSink::new(Box::new(client));
        let mut buf = Vec::new();

        let err = copy_chunk(
            &mut reader,
            &mut buf,
            &mut sink,
            1024,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_open_segment_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.ts"))
            .and(header("referer", "http://site/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 32]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.ts"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::REFERER, "http://site/".parse().unwrap());
        let fetcher = SegmentFetcher::new(test_client(), headers);

        let body = fetcher
            .open_segment(&format!("{}/ok.ts", server.uri()))
            .await
            .unwrap();
        assert_eq!(body.size_hint, Some(32));

        let err = fetcher
            .open_segment(&format!("{}/missing.ts", server.uri()))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HlsDownloaderError::HttpStatus { status, .. } if status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn test_fetch_manifest_tolerates_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.m3u8"))
            .respond_with(ResponseTemplate::new(403).set_body_string("#EXTM3U\n"))
            .mount(&server)
            .await;

        let fetcher = SegmentFetcher::new(test_client(), HeaderMap::new());
        let mut body = fetcher
            .fetch_manifest(&format!("{}/index.m3u8", server.uri()))
            .await
            .unwrap();
        let mut text = String::new();
        body.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "#EXTM3U\n");
    }
}
