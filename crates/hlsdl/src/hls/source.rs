// Segment handoff between the manifest parser task and the download coordinator.
//
// A single mutex guards the queue and the manifest counters; a `Notify` wakes the
// consumer whenever the producer changes either. The consumer re-checks its
// predicate in a loop, so spurious wakeups are harmless.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use super::{HlsDownloaderError, Segment};

/// Terminal status of a manifest parse.
#[derive(Debug, Clone, Default)]
pub enum ManifestStatus {
    #[default]
    Running,
    Finished,
    Errored(HlsDownloaderError),
}

impl ManifestStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ManifestStatus::Running)
    }
}

/// Header fields and aggregate counters of a manifest being parsed.
#[derive(Debug, Clone, Default)]
pub struct ManifestState {
    pub version: i32,
    pub target_duration: i32,
    pub media_sequence: i32,
    pub end_list: bool,
    /// Number of segments produced so far. Never decreases.
    pub segment_count: usize,
    /// Sum of the durations of the segments produced so far, in seconds.
    pub total_duration: f32,
    pub status: ManifestStatus,
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Segment>,
    state: ManifestState,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
}

/// Creates a connected producer/consumer pair for one manifest.
pub fn segment_channel() -> (SegmentProducer, SegmentSource) {
    let shared = Arc::new(Shared::default());
    (
        SegmentProducer {
            shared: Arc::clone(&shared),
        },
        SegmentSource { shared },
    )
}

/// Parser-side handle. Every mutation is visible to the consumer immediately.
///
/// Dropping a producer whose manifest is still running marks it as cancelled,
/// so a consumer never waits on a parser that no longer exists.
#[derive(Debug)]
pub struct SegmentProducer {
    shared: Arc<Shared>,
}

impl SegmentProducer {
    fn update<F: FnOnce(&mut Inner)>(&self, f: F) {
        let mut inner = self.shared.inner.lock();
        if !inner.state.status.is_running() {
            return;
        }
        f(&mut inner);
    }

    pub fn set_version(&self, version: i32) {
        self.update(|inner| inner.state.version = version);
    }

    pub fn set_target_duration(&self, target_duration: i32) {
        self.update(|inner| inner.state.target_duration = target_duration);
    }

    pub fn set_media_sequence(&self, media_sequence: i32) {
        self.update(|inner| inner.state.media_sequence = media_sequence);
    }

    pub fn set_end_list(&self) {
        self.update(|inner| inner.state.end_list = true);
    }

    /// Appends a completed segment and wakes the consumer.
    pub fn push(&self, segment: Segment) {
        self.update(|inner| {
            inner.state.segment_count += 1;
            inner.state.total_duration += segment.duration;
            inner.queue.push_back(segment);
        });
        self.shared.notify.notify_one();
    }

    /// Marks the end of input. A manifest that produced nothing becomes an error.
    pub fn finish(&self) {
        self.update(|inner| {
            inner.state.status = if inner.state.segment_count == 0 {
                ManifestStatus::Errored(HlsDownloaderError::NoSegments)
            } else {
                ManifestStatus::Finished
            };
        });
        self.shared.notify.notify_one();
    }

    pub fn fail(&self, error: HlsDownloaderError) {
        self.update(|inner| inner.state.status = ManifestStatus::Errored(error));
        self.shared.notify.notify_one();
    }

    pub fn state(&self) -> ManifestState {
        self.shared.inner.lock().state.clone()
    }
}

impl Drop for SegmentProducer {
    fn drop(&mut self) {
        self.fail(HlsDownloaderError::Cancelled);
    }
}

/// Consumer-side handle, owned by exactly one downloader.
#[derive(Debug)]
pub struct SegmentSource {
    shared: Arc<Shared>,
}

impl SegmentSource {
    /// Returns the next segment in manifest order.
    ///
    /// `Ok(None)` means the manifest finished and every segment was handed
    /// out. Once the manifest errored and the queue is drained, every call
    /// returns the same error. While the manifest is still running and the
    /// queue is empty, this waits for the parser.
    pub async fn next_segment(&mut self) -> Result<Option<Segment>, HlsDownloaderError> {
        loop {
            {
                let mut inner = self.shared.inner.lock();
                if let Some(segment) = inner.queue.pop_front() {
                    return Ok(Some(segment));
                }
                match &inner.state.status {
                    ManifestStatus::Errored(err) => return Err(err.clone()),
                    ManifestStatus::Finished => return Ok(None),
                    ManifestStatus::Running => {}
                }
            }
            trace!("Segment queue empty, waiting for parser");
            self.shared.notify.notified().await;
        }
    }

    /// Copy of the manifest counters and status.
    pub fn state(&self) -> ManifestState {
        self.shared.inner.lock().state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_fifo_order_and_counters() {
        let (producer, mut source) = segment_channel();
        producer.push(Segment::new(1.5, "", "a.ts"));
        producer.push(Segment::new(2.0, "", "b.ts"));
        producer.finish();

        assert_eq!(source.next_segment().await.unwrap().unwrap().uri, "a.ts");
        assert_eq!(source.next_segment().await.unwrap().unwrap().uri, "b.ts");
        assert!(source.next_segment().await.unwrap().is_none());

        let state = source.state();
        assert_eq!(state.segment_count, 2);
        assert_eq!(state.total_duration, 3.5);
        assert!(matches!(state.status, ManifestStatus::Finished));
    }

    #[tokio::test]
    async fn test_finished_never_blocks() {
        let (producer, mut source) = segment_channel();
        producer.push(Segment::new(1.0, "", "a.ts"));
        producer.finish();
        source.next_segment().await.unwrap();

        for _ in 0..3 {
            let next = timeout(Duration::from_millis(100), source.next_segment())
                .await
                .expect("must not block after finish");
            assert!(next.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_errored_is_idempotent() {
        let (producer, mut source) = segment_channel();
        producer.finish();

        for _ in 0..3 {
            let err = source.next_segment().await.unwrap_err();
            assert!(matches!(err, HlsDownloaderError::NoSegments));
        }
    }

    #[tokio::test]
    async fn test_queued_segments_are_drained_before_error() {
        let (producer, mut source) = segment_channel();
        producer.push(Segment::new(1.0, "", "a.ts"));
        producer.fail(std::io::Error::other("connection reset").into());

        assert!(source.next_segment().await.unwrap().is_some());
        assert!(matches!(
            source.next_segment().await,
            Err(HlsDownloaderError::IoError { .. })
        ));
    }

    #[tokio::test]
    async fn test_terminal_state_is_sticky() {
        let (producer, source) = segment_channel();
        producer.push(Segment::new(1.0, "", "a.ts"));
        producer.finish();
        producer.push(Segment::new(1.0, "", "late.ts"));
        producer.fail(HlsDownloaderError::MissingHeader);

        let state = source.state();
        assert_eq!(state.segment_count, 1);
        assert!(matches!(state.status, ManifestStatus::Finished));
    }

    #[tokio::test]
    async fn test_consumer_waits_for_producer() {
        let (producer, mut source) = segment_channel();

        let consumer = tokio::spawn(async move { source.next_segment().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        producer.push(Segment::new(4.0, "first", "a.ts"));
        let segment = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(segment.title, "first");
    }

    #[tokio::test]
    async fn test_dropped_producer_unblocks_consumer() {
        let (producer, mut source) = segment_channel();
        let consumer = tokio::spawn(async move { source.next_segment().await });
        drop(producer);

        let result = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert!(matches!(result, Err(HlsDownloaderError::Cancelled)));
    }
}
