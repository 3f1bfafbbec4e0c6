// Download coordinator: pulls segments from a SegmentSource one at a time,
// transfers each into the output sink and publishes progress snapshots.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::{HlsConfig, HlsTransferConfig};
use crate::hls::fetcher::{SegmentFetcher, copy_chunk};
use crate::hls::playlist::spawn_parser;
use crate::hls::progress::{ProgressReceiver, ProgressSender, TransferState, progress_channel};
use crate::hls::resolution::{base_url, segment_url};
use crate::hls::source::SegmentSource;
use crate::output::OutputSink;
use crate::{DownloadError, create_client};

/// Lifecycle of a [`DownloadCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
    Finished,
    Failed,
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Finished | CoordinatorState::Failed)
    }
}

/// Handle of the spawned transfer task. Resolves to the outcome of the download.
pub type TransferHandle = JoinHandle<Result<(), HlsDownloaderError>>;

/// Single-use driver of one HLS download.
///
/// `start` (or `start_with_source`) may succeed once; later calls fail with
/// [`HlsDownloaderError::AlreadyStarted`] and leave the running transfer alone.
pub struct DownloadCoordinator {
    fetcher: SegmentFetcher,
    transfer_config: HlsTransferConfig,
    cancel: CancellationToken,
    state: Arc<Mutex<CoordinatorState>>,
}

impl DownloadCoordinator {
    /// Builds the HTTP client from `config.base`.
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.base)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: HlsConfig) -> Self {
        let headers = config.request_headers.to_header_map();
        Self {
            fetcher: SegmentFetcher::new(client, headers),
            transfer_config: config.transfer_config,
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(CoordinatorState::Idle)),
        }
    }

    /// Token that aborts the download when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    fn begin(&self) -> Result<(), HlsDownloaderError> {
        let mut state = self.state.lock();
        if *state != CoordinatorState::Idle {
            return Err(HlsDownloaderError::AlreadyStarted);
        }
        *state = CoordinatorState::Running;
        Ok(())
    }

    async fn reject(sink: &mut dyn OutputSink, err: HlsDownloaderError) -> HlsDownloaderError {
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Failed to close rejected output");
        }
        err
    }

    /// Fetches the manifest at `manifest_url`, parses it in the background and
    /// downloads every segment it lists into `sink`.
    ///
    /// Returns once the manifest response headers have arrived.
    pub async fn start(
        &self,
        manifest_url: &str,
        mut sink: Box<dyn OutputSink>,
    ) -> Result<(ProgressReceiver, TransferHandle), HlsDownloaderError> {
        if let Err(e) = self.begin() {
            return Err(Self::reject(sink.as_mut(), e).await);
        }

        let span = info_span!("hls_download", url = %manifest_url);
        let base = match base_url(manifest_url) {
            Ok(base) => base,
            Err(e) => {
                span.in_scope(|| error!(error = %e, "Invalid manifest URL"));
                *self.state.lock() = CoordinatorState::Failed;
                let err = HlsDownloaderError::Resolution {
                    base_url: manifest_url.to_string(),
                    segment_uri: String::new(),
                };
                return Err(Self::reject(sink.as_mut(), err).await);
            }
        };

        let fetched = async {
            tokio::select! {
                result = self.fetcher.fetch_manifest(manifest_url) => result,
                _ = self.cancel.cancelled() => Err(HlsDownloaderError::Cancelled),
            }
        }
        .instrument(span.clone())
        .await;

        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                span.in_scope(|| error!(error = %e, "Failed to fetch manifest"));
                *self.state.lock() = CoordinatorState::Failed;
                return Err(Self::reject(sink.as_mut(), e).await);
            }
        };

        let parser_cancel = self.cancel.child_token();
        let parser_span = info_span!(parent: &span, "manifest_parser");
        let (source, _parser) = spawn_parser(body, parser_cancel.clone(), parser_span);

        Ok(self.spawn_transfer(source, base, sink, Some(parser_cancel), span))
    }

    /// Downloads the segments of an already running `source` into `sink`,
    /// resolving relative segment URIs against `base_url`.
    pub async fn start_with_source(
        &self,
        source: SegmentSource,
        base_url: impl Into<String>,
        mut sink: Box<dyn OutputSink>,
    ) -> Result<(ProgressReceiver, TransferHandle), HlsDownloaderError> {
        if let Err(e) = self.begin() {
            return Err(Self::reject(sink.as_mut(), e).await);
        }
        let base_url = base_url.into();
        let span = info_span!("hls_download", base = %base_url);
        Ok(self.spawn_transfer(source, base_url, sink, None, span))
    }

    fn spawn_transfer(
        &self,
        source: SegmentSource,
        base_url: String,
        sink: Box<dyn OutputSink>,
        parser_cancel: Option<CancellationToken>,
        span: Span,
    ) -> (ProgressReceiver, TransferHandle) {
        let (progress, progress_rx) = progress_channel();
        let task = TransferTask {
            fetcher: self.fetcher.clone(),
            config: self.transfer_config.clone(),
            base_url,
            source,
            sink,
            progress,
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
        };

        let handle = tokio::spawn(
            async move {
                // The parser has no consumer left once the transfer ends.
                let _parser_guard = parser_cancel.map(CancellationToken::drop_guard);
                task.run().await
            }
            .instrument(span),
        );
        (progress_rx, handle)
    }
}

struct TransferTask {
    fetcher: SegmentFetcher,
    config: HlsTransferConfig,
    base_url: String,
    source: SegmentSource,
    sink: Box<dyn OutputSink>,
    progress: ProgressSender,
    cancel: CancellationToken,
    state: Arc<Mutex<CoordinatorState>>,
}

/// Publishes an interim snapshot; gives up waiting for the observer on cancellation.
async fn publish(
    progress: &ProgressSender,
    source: &SegmentSource,
    transfer: &TransferState,
    cancel: &CancellationToken,
) {
    let snapshot = transfer.snapshot(&source.state());
    tokio::select! {
        _ = progress.publish(snapshot) => {}
        _ = cancel.cancelled() => {}
    }
}

impl TransferTask {
    async fn run(mut self) -> Result<(), HlsDownloaderError> {
        let mut transfer = TransferState::started();
        publish(&self.progress, &self.source, &transfer, &self.cancel).await;

        let mut result = self.transfer_all(&mut transfer).await;

        if let Err(e) = self.sink.close().await {
            error!(error = %e, "Failed to close output");
            if result.is_ok() {
                result = Err(e.into());
            }
        }

        match &result {
            Ok(()) => {
                transfer.finish();
                info!(
                    bytes = self.sink.bytes_written(),
                    segments = self.source.state().segment_count,
                    "Download finished"
                );
            }
            Err(HlsDownloaderError::Cancelled) => {
                transfer.fail(HlsDownloaderError::Cancelled.to_string());
                warn!("Download cancelled");
            }
            Err(e) => {
                transfer.fail(e.to_string());
                error!(error = %e, "Download failed");
            }
        }

        // Settled before observers can see the final snapshot
        *self.state.lock() = if result.is_ok() {
            CoordinatorState::Finished
        } else {
            CoordinatorState::Failed
        };
        // Final snapshot; observers drain until the channel closes.
        self.progress
            .publish(transfer.snapshot(&self.source.state()))
            .await;
        result
    }

    async fn transfer_all(&mut self, transfer: &mut TransferState) -> Result<(), HlsDownloaderError> {
        loop {
            let next = tokio::select! {
                next = self.source.next_segment() => next?,
                _ = self.cancel.cancelled() => return Err(HlsDownloaderError::Cancelled),
            };
            let Some(segment) = next else {
                return Ok(());
            };

            let url = segment_url(&self.base_url, &segment.uri)?;
            transfer.begin_segment(&url);
            debug!(url = %url, duration = segment.duration, "Downloading segment");
            publish(&self.progress, &self.source, transfer, &self.cancel).await;

            self.transfer_segment(&url, transfer).await?;
            transfer.complete_segment(segment.duration);
        }
    }

    async fn transfer_segment(
        &mut self,
        url: &str,
        transfer: &mut TransferState,
    ) -> Result<(), HlsDownloaderError> {
        let Self {
            fetcher,
            config,
            source,
            sink,
            progress,
            cancel,
            ..
        } = self;

        let mut body = tokio::select! {
            body = fetcher.open_segment(url) => body?,
            _ = cancel.cancelled() => return Err(HlsDownloaderError::Cancelled),
        };
        transfer.set_size_hint(body.size_hint);
        publish(progress, source, transfer, cancel).await;

        let mut buf = Vec::new();
        let mut ticker = tokio::time::interval(config.progress_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            let copy = copy_chunk(
                &mut body.reader,
                &mut buf,
                &mut **sink,
                config.chunk_size,
                config.segment_stall_timeout,
            );
            tokio::pin!(copy);

            let chunk = loop {
                tokio::select! {
                    result = &mut copy => break result?,
                    _ = ticker.tick() => publish(progress, source, transfer, cancel).await,
                    _ = cancel.cancelled() => return Err(HlsDownloaderError::Cancelled),
                }
            };

            transfer.add_bytes(chunk.copied);
            publish(progress, source, transfer, cancel).await;
            if chunk.eof {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DownloaderConfig;
    use crate::hls::config::RequestHeaders;
    use crate::hls::progress::TransferSnapshot;
    use crate::hls::source::segment_channel;
    use crate::hls::Segment;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct MemorySink {
        data: Arc<Mutex<Vec<u8>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl OutputSink for MemorySink {
        async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.data.lock().extend_from_slice(bytes);
            Ok(())
        }

        async fn close(&mut self) -> std::io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn bytes_written(&self) -> u64 {
            self.data.lock().len() as u64
        }
    }

    fn test_config() -> HlsConfig {
        HlsConfig {
            base: DownloaderConfig::builder().with_system_proxy(false).build(),
            ..Default::default()
        }
    }

    async fn drain(mut rx: ProgressReceiver) -> Vec<TransferSnapshot> {
        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }
        snapshots
    }

    const MANIFEST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXTINF:4.0,
seg1.ts
#EXTINF:2.5,
/other/seg2.ts
#EXT-X-ENDLIST
";

    async fn mount_manifest(server: &MockServer, segment2: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/live/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/live/seg1.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1000]))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/other/seg2.ts"))
            .respond_with(segment2)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_download_all_segments() {
        crate::init_test_tracing!();
        let server = MockServer::start().await;
        mount_manifest(&server, ResponseTemplate::new(200).set_body_bytes(vec![2u8; 500])).await;

        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start(&format!("{}/live/index.m3u8", server.uri()), Box::new(sink.clone()))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        handle.await.unwrap().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Finished);

        let last = snapshots.last().unwrap();
        assert!(last.started);
        assert!(last.finished);
        assert!(last.error.is_none());
        assert_eq!(last.got_bytes, 1500);
        assert_eq!(last.segments_count, 2);
        assert_eq!(last.segments_duration, 6.5);
        assert_eq!(last.downloaded_duration, 6.5);
        assert!(snapshots.iter().any(|s| {
            s.current_segment.num == 2 && s.current_segment.url.ends_with("/other/seg2.ts")
        }));

        let data = sink.data.lock();
        assert_eq!(data.len(), 1500);
        assert!(data[..1000].iter().all(|b| *b == 1));
        assert!(data[1000..].iter().all(|b| *b == 2));
        assert!(sink.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_state_settled_with_final_snapshot() {
        let server = MockServer::start().await;
        mount_manifest(&server, ResponseTemplate::new(200).set_body_bytes(vec![2u8; 10])).await;

        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let (mut rx, _handle) = coordinator
            .start(&format!("{}/live/index.m3u8", server.uri()), Box::new(MemorySink::default()))
            .await
            .unwrap();

        // Stop reading at the final snapshot, before the channel closes
        loop {
            let snapshot = rx.recv().await.unwrap();
            if snapshot.is_terminal() {
                assert!(snapshot.finished);
                break;
            }
        }
        assert_eq!(coordinator.state(), CoordinatorState::Finished);
    }

    /// Serves one 8-byte body whose second half arrives after `pause`.
    async fn stalling_segment_server(pause: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\nAAAA")
                .await
                .unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(pause).await;
            stream.write_all(b"BBBB").await.unwrap();
            stream.flush().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_progress_ticks_while_segment_stalls() {
        let base = stalling_segment_server(Duration::from_millis(400)).await;
        let mut config = test_config();
        config.transfer_config.chunk_size = 4;
        config.transfer_config.progress_interval = Duration::from_millis(50);
        let coordinator = DownloadCoordinator::new(config).unwrap();

        let (producer, source) = segment_channel();
        producer.push(Segment::new(2.0, "", "seg.ts"));
        producer.finish();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start_with_source(source, base, Box::new(sink.clone()))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        handle.await.unwrap().unwrap();
        assert_eq!(sink.data.lock().as_slice(), b"AAAABBBB");

        // One snapshot after the first half, then idle ticks repeat it
        let stalled = snapshots
            .iter()
            .filter(|s| !s.is_terminal() && s.current_segment.got_bytes == 4)
            .count();
        assert!(stalled >= 3, "only {stalled} snapshots during the stall");
        assert_eq!(snapshots.last().unwrap().got_bytes, 8);
    }

    #[tokio::test]
    async fn test_segment_error_aborts_download() {
        crate::init_test_tracing!();
        let server = MockServer::start().await;
        mount_manifest(&server, ResponseTemplate::new(404)).await;

        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start(&format!("{}/live/index.m3u8", server.uri()), Box::new(sink.clone()))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, HlsDownloaderError::HttpStatus { .. }));
        assert_eq!(coordinator.state(), CoordinatorState::Failed);

        let last = snapshots.last().unwrap();
        assert!(last.started);
        assert!(!last.finished);
        assert!(last.error.as_deref().unwrap().contains("404"));
        assert_eq!(sink.data.lock().len(), 1000);
        assert!(sink.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_header_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start(&format!("{}/index.m3u8", server.uri()), Box::new(sink.clone()))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        assert!(matches!(
            handle.await.unwrap(),
            Err(HlsDownloaderError::MissingHeader)
        ));
        assert_eq!(snapshots.last().unwrap().segments_count, 0);
        assert!(sink.data.lock().is_empty());
    }

    #[tokio::test]
    async fn test_forwards_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.m3u8"))
            .and(header("referer", "http://site/page"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:1,\na.ts\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.ts"))
            .and(header("referer", "http://site/page"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ts".to_vec()))
            .mount(&server)
            .await;

        let config = HlsConfig {
            request_headers: RequestHeaders::new(
                Some("http://site/page".to_string()),
                Some("TestAgent/1.0".to_string()),
            ),
            ..test_config()
        };
        let coordinator = DownloadCoordinator::new(config).unwrap();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start(&format!("{}/index.m3u8", server.uri()), Box::new(sink.clone()))
            .await
            .unwrap();
        drain(rx).await;
        handle.await.unwrap().unwrap();
        assert_eq!(sink.data.lock().as_slice(), b"ts");
    }

    #[tokio::test]
    async fn test_start_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 10]))
            .mount(&server)
            .await;

        let (producer, source) = segment_channel();
        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start_with_source(source, server.uri(), Box::new(sink.clone()))
            .await
            .unwrap();

        let (_, second_source) = segment_channel();
        let second_sink = MemorySink::default();
        let err = coordinator
            .start_with_source(second_source, server.uri(), Box::new(second_sink.clone()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HlsDownloaderError::AlreadyStarted));
        assert!(second_sink.closed.load(Ordering::SeqCst));

        producer.push(Segment::new(1.0, "", "a.ts"));
        producer.finish();

        drain(rx).await;
        handle.await.unwrap().unwrap();
        assert_eq!(sink.data.lock().len(), 10);
        assert!(coordinator.state().is_terminal());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_segments() {
        let (producer, source) = segment_channel();
        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let sink = MemorySink::default();
        let (rx, handle) = coordinator
            .start_with_source(source, "http://127.0.0.1:9", Box::new(sink.clone()))
            .await
            .unwrap();

        let collector = tokio::spawn(drain(rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.cancellation_token().cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(HlsDownloaderError::Cancelled)));

        let snapshots = collector.await.unwrap();
        let last = snapshots.last().unwrap();
        assert_eq!(last.error.as_deref(), Some("Operation cancelled"));
        assert!(sink.closed.load(Ordering::SeqCst));
        drop(producer);
    }

    #[tokio::test]
    async fn test_invalid_manifest_url() {
        let coordinator = DownloadCoordinator::new(test_config()).unwrap();
        let sink = MemorySink::default();
        let err = coordinator
            .start("not a url", Box::new(sink.clone()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HlsDownloaderError::Resolution { .. }));
        assert_eq!(coordinator.state(), CoordinatorState::Failed);
        assert!(sink.closed.load(Ordering::SeqCst));
    }
}
