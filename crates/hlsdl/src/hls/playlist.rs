// HLS manifest parser: validates the header and turns manifest lines into segments
// as they are read from the network.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use super::source::{SegmentProducer, SegmentSource, segment_channel};
use super::{HlsDownloaderError, Segment};

/// Format header every manifest must start with.
pub const EXTM3U: &[u8] = b"#EXTM3U";

static EXTINF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXTINF:([\d\.]+),(.*)").unwrap());
static URI_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([^\s#].*)").unwrap());
static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXT-X-VERSION:(\d+)$").unwrap());
static TARGET_DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXT-X-TARGETDURATION:(\d+)$").unwrap());
static MEDIA_SEQUENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXT-X-MEDIA-SEQUENCE:(\d+)$").unwrap());
static END_LIST_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#EXT-X-ENDLIST$").unwrap());

/// A recognized manifest line.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestEvent {
    Segment(Segment),
    Version(i32),
    TargetDuration(i32),
    MediaSequence(i32),
    EndList,
}

#[derive(Debug)]
struct PendingSegment {
    duration: f32,
    title: String,
}

/// Line-level state machine shared by the streaming and the buffered parser.
///
/// Recognizers are tried in a fixed order and the first match wins. Lines that
/// match nothing are ignored.
#[derive(Debug, Default)]
pub struct LineParser {
    pending: Option<PendingSegment>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line with its terminator already removed.
    pub fn feed(&mut self, line: &str) -> Option<ManifestEvent> {
        if line.is_empty() {
            return None;
        }
        if let Some(caps) = EXTINF_REGEX.captures(line) {
            match caps[1].parse::<f32>() {
                Ok(duration) => {
                    self.pending = Some(PendingSegment {
                        duration,
                        title: caps[2].to_string(),
                    });
                    return None;
                }
                Err(e) => {
                    warn!(line, error = %e, "Can't parse #EXTINF duration");
                }
            }
        }
        if self.pending.is_some() && URI_REGEX.is_match(line) {
            if let Some(pending) = self.pending.take() {
                return Some(ManifestEvent::Segment(Segment::new(
                    pending.duration,
                    pending.title,
                    line,
                )));
            }
        }
        if let Some(value) = parse_int(line, &VERSION_REGEX) {
            return Some(ManifestEvent::Version(value));
        }
        if let Some(value) = parse_int(line, &TARGET_DURATION_REGEX) {
            return Some(ManifestEvent::TargetDuration(value));
        }
        if let Some(value) = parse_int(line, &MEDIA_SEQUENCE_REGEX) {
            return Some(ManifestEvent::MediaSequence(value));
        }
        if END_LIST_REGEX.is_match(line) {
            return Some(ManifestEvent::EndList);
        }
        None
    }
}

fn parse_int(line: &str, regex: &Regex) -> Option<i32> {
    let caps = regex.captures(line)?;
    match caps[1].parse::<i32>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(line, error = %e, "Can't parse integer directive");
            None
        }
    }
}

fn strip_terminator(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Streaming parser: reads a manifest and publishes segments through a
/// [`SegmentProducer`] while the rest of the document is still in flight.
pub struct ManifestParser<R> {
    reader: BufReader<R>,
    producer: SegmentProducer,
    lines: LineParser,
}

impl<R: AsyncRead + Unpin> ManifestParser<R> {
    pub fn new(reader: R, producer: SegmentProducer) -> Self {
        Self {
            reader: BufReader::new(reader),
            producer,
            lines: LineParser::new(),
        }
    }

    async fn read_header(&mut self) -> Result<(), HlsDownloaderError> {
        let mut header = [0u8; EXTM3U.len()];
        if let Err(e) = self.reader.read_exact(&mut header).await {
            warn!(error = %e, "Error during read of #EXTM3U");
            return Err(HlsDownloaderError::MissingHeader);
        }
        if header != EXTM3U {
            warn!(
                got = %String::from_utf8_lossy(&header),
                "Manifest does not start with #EXTM3U"
            );
            return Err(HlsDownloaderError::MissingHeader);
        }
        Ok(())
    }

    async fn parse(&mut self) -> Result<(), HlsDownloaderError> {
        self.read_header().await?;

        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let read = self.reader.read_until(b'\n', &mut buf).await?;
            if read == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(strip_terminator(&buf));
            match self.lines.feed(&line) {
                Some(ManifestEvent::Segment(segment)) => self.producer.push(segment),
                Some(ManifestEvent::Version(v)) => self.producer.set_version(v),
                Some(ManifestEvent::TargetDuration(v)) => self.producer.set_target_duration(v),
                Some(ManifestEvent::MediaSequence(v)) => self.producer.set_media_sequence(v),
                Some(ManifestEvent::EndList) => self.producer.set_end_list(),
                None => {}
            }
        }
    }

    /// Parses until end of input or the first fatal error.
    pub async fn run(mut self) {
        match self.parse().await {
            Ok(()) => self.producer.finish(),
            Err(e) => self.producer.fail(e),
        }
        let state = self.producer.state();
        match &state.status {
            super::ManifestStatus::Errored(e) => {
                warn!(error = %e, segments = state.segment_count, "Manifest parsing failed");
            }
            _ => {
                info!(
                    segments = state.segment_count,
                    duration = state.total_duration,
                    end_list = state.end_list,
                    "Manifest parsed"
                );
            }
        }
    }
}

/// Spawns the streaming parser on its own task and returns the consumer side.
///
/// Cancelling `cancel` stops the parser and surfaces `Cancelled` to the consumer.
pub fn spawn_parser<R>(
    reader: R,
    cancel: CancellationToken,
    span: Span,
) -> (SegmentSource, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (producer, source) = segment_channel();
    let parser = ManifestParser::new(reader, producer);
    let handle = tokio::spawn(
        async move {
            tokio::select! {
                _ = parser.run() => {}
                _ = cancel.cancelled() => {
                    debug!("Manifest parser cancelled");
                }
            }
        }
        .instrument(span),
    );
    (source, handle)
}

/// A fully parsed manifest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    pub version: i32,
    pub target_duration: i32,
    pub media_sequence: i32,
    pub end_list: bool,
    pub segments: Vec<Segment>,
}

impl Manifest {
    pub fn total_duration(&self) -> f32 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Parses a manifest that is already fully in memory.
pub fn parse_manifest(data: &[u8]) -> Result<Manifest, HlsDownloaderError> {
    let body = data
        .strip_prefix(EXTM3U)
        .ok_or(HlsDownloaderError::MissingHeader)?;

    let mut manifest = Manifest::default();
    let mut lines = LineParser::new();
    for raw in body.split(|b| *b == b'\n') {
        let line = String::from_utf8_lossy(strip_terminator(raw));
        match lines.feed(&line) {
            Some(ManifestEvent::Segment(segment)) => manifest.segments.push(segment),
            Some(ManifestEvent::Version(v)) => manifest.version = v,
            Some(ManifestEvent::TargetDuration(v)) => manifest.target_duration = v,
            Some(ManifestEvent::MediaSequence(v)) => manifest.media_sequence = v,
            Some(ManifestEvent::EndList) => manifest.end_list = true,
            None => {}
        }
    }

    if manifest.segments.is_empty() {
        return Err(HlsDownloaderError::NoSegments);
    }
    Ok(manifest)
}
