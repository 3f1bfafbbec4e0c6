//! Output destinations and the output path policy.

mod provider;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

pub use provider::{FileSink, OutputSink, PipeSink, RemuxSink};

/// Output path that means "write to standard output".
pub const STDOUT_PATH: &str = "-";

/// What to do when the output file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Refuse to start.
    #[default]
    Fail,
    /// Prefix the file name with `_` until it is unused.
    Unique,
    /// Truncate the existing file.
    Overwrite,
}

impl std::str::FromStr for OverwritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" | "" => Ok(OverwritePolicy::Fail),
            "uniq" | "unique" => Ok(OverwritePolicy::Unique),
            "overwrite" => Ok(OverwritePolicy::Overwrite),
            _ => Err(format!("Unknown overwrite policy: {s}")),
        }
    }
}

impl std::fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverwritePolicy::Fail => write!(f, "fail"),
            OverwritePolicy::Unique => write!(f, "uniq"),
            OverwritePolicy::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// A resolved output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    /// Without `truncate` the file must not exist yet.
    File { path: PathBuf, truncate: bool },
}

/// `<unix timestamp>.mp4`, used when no output name is given.
pub fn default_output_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{secs}.mp4")
}

/// Creates `path` if it does not exist yet, so no other run can pick it.
fn reserve(path: &Path) -> std::io::Result<bool> {
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

fn reserve_unique(path: &Path) -> std::io::Result<PathBuf> {
    let mut candidate = path.to_path_buf();
    while !reserve(&candidate)? {
        let name = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        candidate.set_file_name(format!("_{name}"));
    }
    Ok(candidate)
}

/// Applies the overwrite policy to a requested output path.
///
/// With `Fail` and `Unique` the returned file has already been created
/// (empty) by this call, so concurrent callers never get the same path.
pub fn resolve_output_path(
    requested: &str,
    policy: OverwritePolicy,
) -> std::io::Result<OutputTarget> {
    if requested == STDOUT_PATH {
        return Ok(OutputTarget::Stdout);
    }
    let path = if requested.is_empty() {
        PathBuf::from(default_output_name())
    } else {
        PathBuf::from(requested)
    };

    let path = match policy {
        OverwritePolicy::Fail => {
            if !reserve(&path)? {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("'{}' already exists", path.display()),
                ));
            }
            path
        }
        OverwritePolicy::Unique => reserve_unique(&path)?,
        OverwritePolicy::Overwrite => path,
    };
    Ok(OutputTarget::File {
        path,
        truncate: true,
    })
}

/// Opens the sink for `target`.
///
/// With `remux_program` the media is piped through the remux process; if it
/// cannot be started the raw stream is written to the file instead.
pub async fn open_output(
    target: &OutputTarget,
    remux_program: Option<&str>,
) -> std::io::Result<Box<dyn OutputSink>> {
    match target {
        OutputTarget::Stdout => Ok(Box::new(PipeSink::stdout())),
        OutputTarget::File { path, truncate } => {
            if let Some(program) = remux_program {
                match RemuxSink::spawn(RemuxSink::ffmpeg_command(program, path)) {
                    Ok(sink) => {
                        let sink = sink.remove_if_empty(path.clone());
                        info!(path = %path.display(), program, "Remuxing output");
                        return Ok(Box::new(sink));
                    }
                    Err(e) => {
                        error!(program, error = %e, "Can't start remux process");
                        warn!("Saving the raw stream to the file instead");
                    }
                }
            }
            Ok(Box::new(FileSink::create(path.clone(), *truncate).await?))
        }
    }
}
