use hlsdl_engine::hls::TransferSnapshot;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::Cell;
use std::time::Duration;
use tracing::info;

use super::{format_bytes, format_duration};

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// One-line summary of a snapshot
pub fn describe(snapshot: &TransferSnapshot) -> String {
    let segment = &snapshot.current_segment;
    let segment_size = match segment.size {
        Some(size) => format!("{}/{}", format_bytes(segment.got_bytes), format_bytes(size)),
        None => format_bytes(segment.got_bytes),
    };
    format!(
        "segment {}/{} ({segment_size}) | {} total | {} of {}",
        segment.num,
        snapshot.segments_count,
        format_bytes(snapshot.got_bytes),
        format_duration(snapshot.downloaded_duration as f64),
        format_duration(snapshot.segments_duration as f64),
    )
}

/// Renders transfer snapshots, either as a progress bar or as log lines
pub struct ProgressManager {
    bar: Option<ProgressBar>,
    /// Last segment number reported in log mode
    last_segment: Cell<usize>,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(download_style());
        bar.enable_steady_tick(Duration::from_millis(500));
        Self {
            bar: Some(bar),
            last_segment: Cell::new(0),
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            bar: None,
            last_segment: Cell::new(0),
        }
    }

    pub fn handle_snapshot(&self, snapshot: &TransferSnapshot) {
        let segment = &snapshot.current_segment;
        match &self.bar {
            Some(bar) => {
                bar.set_length(snapshot.segments_count as u64);
                bar.set_position(segment.num.saturating_sub(1) as u64);
                bar.set_message(describe(snapshot));
            }
            None => {
                if segment.num > 0 && self.last_segment.replace(segment.num) != segment.num {
                    info!(
                        "Segment {}/{}: {}",
                        segment.num, snapshot.segments_count, segment.url
                    );
                }
            }
        }
    }

    pub fn finish(&self, snapshot: &TransferSnapshot) {
        let summary = describe(snapshot);
        match (&self.bar, &snapshot.error) {
            (Some(bar), None) => {
                bar.set_position(snapshot.segments_count as u64);
                bar.finish_with_message(format!("Finished: {summary}"));
            }
            (Some(bar), Some(error)) => bar.abandon_with_message(format!("Failed: {error}")),
            (None, _) => info!("{summary}"),
        }
    }
}
