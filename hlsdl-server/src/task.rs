//! Downloads started through the HTTP front-end.

use hlsdl_engine::hls::{ProgressReceiver, SegmentProgress, TransferHandle, TransferSnapshot};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Progress of a task as served to browsers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskInfo {
    pub filename: String,
    pub url: String,
    pub source: String,
    pub current_segment: SegmentProgress,
    pub downloaded_duration: f32,
    /// Empty while no error occurred.
    pub error: String,
    /// Set once the download stopped, successfully or not.
    pub finished: bool,
    pub got_bytes: u64,
    pub started: bool,
    pub segments_count: usize,
    pub segments_duration: f32,
}

impl TaskInfo {
    fn apply(&mut self, snapshot: &TransferSnapshot) {
        self.current_segment = snapshot.current_segment.clone();
        self.downloaded_duration = snapshot.downloaded_duration;
        self.error = snapshot.error.clone().unwrap_or_default();
        self.finished = snapshot.is_terminal();
        self.got_bytes = snapshot.got_bytes;
        self.started = snapshot.started;
        self.segments_count = snapshot.segments_count;
        self.segments_duration = snapshot.segments_duration;
    }
}

#[derive(Debug)]
pub struct Task {
    pub id: usize,
    pub filename: String,
    pub url: String,
    pub source: String,
    info: watch::Receiver<TaskInfo>,
}

impl Task {
    /// Current progress.
    pub fn info(&self) -> TaskInfo {
        self.info.borrow().clone()
    }

    /// A receiver that sees every later update; closed once the download ends.
    pub fn subscribe(&self) -> watch::Receiver<TaskInfo> {
        self.info.clone()
    }
}

/// A started download waiting to be registered under an id.
pub struct PendingTask {
    pub filename: String,
    pub url: String,
    pub source: String,
    /// Cancels the download.
    pub cancel: CancellationToken,
    pub progress: ProgressReceiver,
    pub handle: TransferHandle,
}

impl PendingTask {
    /// Registers the task as `id` and forwards its progress until the transfer ends.
    ///
    /// `shutdown` cancels the download.
    pub fn spawn(self, id: usize, shutdown: CancellationToken) -> Task {
        let initial = TaskInfo {
            filename: self.filename.clone(),
            url: self.url.clone(),
            source: self.source.clone(),
            ..Default::default()
        };
        let (tx, rx) = watch::channel(initial);
        let span = info_span!("task", id, filename = %self.filename);
        tokio::spawn(
            forward_progress(self.progress, self.handle, tx, self.cancel, shutdown).instrument(span),
        );
        Task {
            id,
            filename: self.filename,
            url: self.url,
            source: self.source,
            info: rx,
        }
    }
}

async fn forward_progress(
    mut progress: ProgressReceiver,
    handle: TransferHandle,
    tx: watch::Sender<TaskInfo>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            snapshot = progress.recv() => match snapshot {
                Some(snapshot) => tx.send_modify(|info| info.apply(&snapshot)),
                None => break,
            },
            _ = shutdown.cancelled(), if !cancel.is_cancelled() => {
                debug!("Server shutting down, cancelling download");
                cancel.cancel();
            }
        }
    }

    match handle.await {
        Ok(Ok(())) => info!("Download finished"),
        Ok(Err(e)) => warn!(error = %e, "Download failed"),
        Err(e) => {
            error!(error = %e, "Download task panicked");
            tx.send_modify(|info| {
                info.error = e.to_string();
                info.finished = true;
            });
        }
    }
    // Dropping `tx` closes every subscriber's stream
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_from_failed_snapshot() {
        let mut info = TaskInfo::default();
        info.apply(&TransferSnapshot {
            current_segment: SegmentProgress {
                num: 1,
                got_bytes: 10,
                size: None,
                url: "http://h/a.ts".to_string(),
            },
            got_bytes: 10,
            started: true,
            error: Some("HTTP status 404 Not Found".to_string()),
            ..Default::default()
        });
        assert!(info.finished);
        assert_eq!(info.error, "HTTP status 404 Not Found");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["current_segment"]["num"], 1);
        assert_eq!(json["current_segment"]["size"], serde_json::Value::Null);
        assert_eq!(json["finished"], true);
        assert_eq!(json["source"], "");
    }
}
