// Progress reporting from the download coordinator to its observers.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use super::ManifestState;

/// Per-segment part of a [`TransferSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentProgress {
    /// 1-based index of the segment being transferred; 0 before the first one.
    pub num: usize,
    pub got_bytes: u64,
    /// `Content-Length` of the segment response, when the server sent one.
    pub size: Option<u64>,
    pub url: String,
}

/// Point-in-time copy of a download's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferSnapshot {
    pub current_segment: SegmentProgress,
    pub got_bytes: u64,
    /// Play duration of the segments fully written so far, in seconds.
    pub downloaded_duration: f32,
    /// Segments announced by the manifest so far.
    pub segments_count: usize,
    pub segments_duration: f32,
    pub started: bool,
    pub finished: bool,
    pub error: Option<String>,
}

impl TransferSnapshot {
    /// True once the transfer stopped, successfully or not.
    pub fn is_terminal(&self) -> bool {
        self.finished || self.error.is_some()
    }
}

/// Mutable progress owned by the coordinator task.
#[derive(Debug, Default)]
pub(crate) struct TransferState {
    snapshot: TransferSnapshot,
}

impl TransferState {
    pub(crate) fn started() -> Self {
        let mut state = Self::default();
        state.snapshot.started = true;
        state
    }

    pub(crate) fn begin_segment(&mut self, url: &str) {
        let current = &mut self.snapshot.current_segment;
        current.num += 1;
        current.got_bytes = 0;
        current.size = None;
        current.url = url.to_string();
    }

    pub(crate) fn set_size_hint(&mut self, size: Option<u64>) {
        self.snapshot.current_segment.size = size;
    }

    pub(crate) fn add_bytes(&mut self, bytes: u64) {
        self.snapshot.current_segment.got_bytes += bytes;
        self.snapshot.got_bytes += bytes;
    }

    pub(crate) fn complete_segment(&mut self, duration: f32) {
        self.snapshot.downloaded_duration += duration;
    }

    pub(crate) fn finish(&mut self) {
        self.snapshot.finished = true;
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.snapshot.error = Some(error);
    }

    pub(crate) fn snapshot(&self, manifest: &ManifestState) -> TransferSnapshot {
        let mut snapshot = self.snapshot.clone();
        snapshot.segments_count = manifest.segment_count;
        snapshot.segments_duration = manifest.total_duration;
        snapshot
    }
}

/// Receiving end of a progress channel.
pub type ProgressReceiver = mpsc::Receiver<TransferSnapshot>;

/// Sending end of a single-slot progress channel.
///
/// `publish` waits while the previous snapshot is still undrained. Once the
/// receiver is gone publishing becomes a no-op; the download itself goes on.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<TransferSnapshot>,
}

impl ProgressSender {
    pub async fn publish(&self, snapshot: TransferSnapshot) {
        if self.tx.is_closed() {
            return;
        }
        if self.tx.send(snapshot).await.is_err() {
            trace!("Progress receiver dropped");
        }
    }
}

/// Creates a progress channel holding at most one undelivered snapshot.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ProgressSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transfer_state_counters() {
        let mut state = TransferState::started();
        state.begin_segment("http://h/a.ts");
        state.set_size_hint(Some(10));
        state.add_bytes(4);
        state.add_bytes(6);
        state.complete_segment(2.5);
        state.begin_segment("http://h/b.ts");
        state.add_bytes(3);

        let manifest = ManifestState {
            segment_count: 5,
            total_duration: 12.5,
            ..Default::default()
        };
        let snapshot = state.snapshot(&manifest);
        assert!(snapshot.started);
        assert_eq!(snapshot.current_segment.num, 2);
        assert_eq!(snapshot.current_segment.got_bytes, 3);
        assert_eq!(snapshot.current_segment.size, None);
        assert_eq!(snapshot.current_segment.url, "http://h/b.ts");
        assert_eq!(snapshot.got_bytes, 13);
        assert_eq!(snapshot.downloaded_duration, 2.5);
        assert_eq!(snapshot.segments_count, 5);
        assert!(!snapshot.is_terminal());

        state.fail("boom".to_string());
        assert!(state.snapshot(&manifest).is_terminal());
    }

    #[tokio::test]
    async fn test_publish_waits_for_drain() {
        let (tx, mut rx) = progress_channel();
        tx.publish(TransferSnapshot::default()).await;

        let second = tokio::time::timeout(
            Duration::from_millis(50),
            tx.publish(TransferSnapshot {
                got_bytes: 1,
                ..Default::default()
            }),
        )
        .await;
        assert!(second.is_err(), "second publish must wait for the first to drain");

        assert_eq!(rx.recv().await.unwrap().got_bytes, 0);
        tx.publish(TransferSnapshot {
            got_bytes: 2,
            ..Default::default()
        })
        .await;
        assert_eq!(rx.recv().await.unwrap().got_bytes, 2);
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.publish(TransferSnapshot::default()).await;
        tx.publish(TransferSnapshot::default()).await;
    }
}
