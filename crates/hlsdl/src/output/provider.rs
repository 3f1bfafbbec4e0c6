use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{self, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

/// Destination of the downloaded media bytes.
///
/// Writes arrive in segment order. `close` is called exactly once, when the
/// download ends for any reason.
#[async_trait]
pub trait OutputSink: Send {
    /// Write all bytes to the output
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush and release the output
    async fn close(&mut self) -> io::Result<()>;

    /// Get total bytes written so far
    fn bytes_written(&self) -> u64;
}

/// A file-based output sink
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Opens `path` for writing. With `truncate` an existing file is replaced,
    /// otherwise the file must not exist yet.
    pub async fn create(path: impl Into<PathBuf>, truncate: bool) -> io::Result<Self> {
        let path = path.into();
        let mut options = OpenOptions::new();
        options.write(true);
        if truncate {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&path).await?;
        info!(path = %path.display(), "Creating file output");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Nothing was downloaded: do not leave an empty file behind.
async fn remove_empty_output(path: &Path) {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() == 0 => {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove empty output");
            } else {
                debug!(path = %path.display(), "Removed empty output");
            }
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to stat output"),
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "output already closed")
}

#[async_trait]
impl OutputSink for FileSink {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(closed_error)?;
        writer.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut writer = self.writer.take().ok_or_else(closed_error)?;
        let result = writer.shutdown().await;
        drop(writer);

        if self.bytes_written == 0 {
            remove_empty_output(&self.path).await;
        }
        result
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// A pipe-based output sink, used for stdout
pub struct PipeSink {
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    bytes_written: u64,
}

impl PipeSink {
    /// Create a new stdout output sink
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Some(writer),
            bytes_written: 0,
        }
    }
}

#[async_trait]
impl OutputSink for PipeSink {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(closed_error)?;
        writer.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut writer = self.writer.take().ok_or_else(closed_error)?;
        writer.flush().await
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Pipes the media into the standard input of an external remux process.
pub struct RemuxSink {
    child: Child,
    stdin: Option<ChildStdin>,
    bytes_written: u64,
    /// Removed on close when nothing was piped and it is still empty
    output: Option<PathBuf>,
}

impl RemuxSink {
    /// `ffmpeg -f mpegts -vcodec h264 -i - -codec copy <output>`
    pub fn ffmpeg_command(program: &str, output: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(["-y", "-f", "mpegts", "-vcodec", "h264", "-i", "-", "-codec", "copy"])
            .arg(output);
        cmd
    }

    /// Spawns `cmd` with a piped stdin. Its stderr is forwarded to the log.
    pub fn spawn(mut cmd: Command) -> io::Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("remux process has no stdin"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "hlsdl::remux", "{line}");
                }
            });
        }

        info!(pid = child.id(), "Started remux process");
        Ok(Self {
            child,
            stdin: Some(stdin),
            bytes_written: 0,
            output: None,
        })
    }

    /// Deletes `output` on close if the download produced nothing.
    pub fn remove_if_empty(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }
}

#[async_trait]
impl OutputSink for RemuxSink {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(closed_error)?;
        stdin.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut stdin = self.stdin.take().ok_or_else(closed_error)?;
        let flushed = stdin.flush().await;
        // Dropping stdin sends EOF to the process.
        drop(stdin);

        let status = self.child.wait().await?;
        if let Some(output) = self.output.as_deref().filter(|_| self.bytes_written == 0) {
            remove_empty_output(output).await;
        }
        flushed?;
        if status.success() {
            debug!("Remux process exited successfully");
            Ok(())
        } else {
            Err(io::Error::other(format!("remux process exited with {status}")))
        }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
