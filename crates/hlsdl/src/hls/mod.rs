// HLS download engine: streaming manifest parser, segment handoff, download
// coordinator and progress reporting.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod playlist;
pub mod progress;
pub mod resolution;
pub mod segment;
pub mod source;

pub use config::{HlsConfig, HlsTransferConfig, RequestHeaders};
pub use coordinator::{CoordinatorState, DownloadCoordinator, TransferHandle};
pub use error::HlsDownloaderError;
pub use playlist::{Manifest, ManifestParser, parse_manifest, spawn_parser};
pub use progress::{
    ProgressReceiver, ProgressSender, SegmentProgress, TransferSnapshot, progress_channel,
};
pub use resolution::{base_url, segment_url};
pub use segment::Segment;
pub use source::{ManifestState, ManifestStatus, SegmentProducer, SegmentSource, segment_channel};
