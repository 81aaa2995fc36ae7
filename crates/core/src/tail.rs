//! Follow a growing log file line by line.
//!
//! Each [`LogTailer`] tracks a byte offset into one file. Only complete
//! lines (terminated by `\n`) are emitted; a partial trailing line stays
//! unread until its newline arrives. The tailer survives the file being
//! deleted, recreated, truncated or replaced.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;

use crate::ansi::strip_ansi;
use crate::broadcast::Broadcaster;

/// A monitored log file and the channel its lines are published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSource {
    channel: String,
    path: PathBuf,
}

impl LogSource {
    pub fn new(channel: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            channel: channel.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Polling intervals for a tailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailConfig {
    /// Sleep between reads while the file exists but has no new data.
    pub poll_interval: Duration,
    /// Sleep between existence checks while the file is missing.
    pub missing_interval: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            missing_interval: Duration::from_secs(2),
        }
    }
}

/// New lines from one poll, plus the offset they were read up to.
///
/// `lines` may be empty when only the offset moved (the file appeared,
/// vanished or was reset). Consumers treat `offset` as the boundary
/// between history and live output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailUpdate {
    pub channel: String,
    pub lines: Vec<String>,
    pub offset: u64,
}

/// Device and inode on unix; replacement of the file under the same name
/// changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity(u64, u64);

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self(meta.dev(), meta.ino()))
    }

    #[cfg(not(unix))]
    fn of(_meta: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailState {
    AwaitingFile,
    Streaming {
        offset: u64,
        identity: Option<FileIdentity>,
    },
}

pub struct LogTailer {
    source: LogSource,
    config: TailConfig,
    state: TailState,
}

impl LogTailer {
    /// Create a tailer positioned at the current end of the file, or
    /// waiting for it if it does not exist yet. Existing content is never
    /// emitted as live lines.
    pub async fn start(source: LogSource, config: TailConfig) -> Self {
        let state = match tokio::fs::metadata(source.path()).await {
            Ok(meta) => TailState::Streaming {
                offset: meta.len(),
                identity: FileIdentity::of(&meta),
            },
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(channel = %source.channel(), error = %e, "cannot stat log file");
                }
                TailState::AwaitingFile
            }
        };
        Self {
            source,
            config,
            state,
        }
    }

    /// Byte offset read up to, or `None` while the file is missing.
    pub fn offset(&self) -> Option<u64> {
        match self.state {
            TailState::Streaming { offset, .. } => Some(offset),
            TailState::AwaitingFile => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, TailState::Streaming { .. })
    }

    /// An update carrying no lines, only the current offset.
    pub fn checkpoint(&self) -> TailUpdate {
        self.update(Vec::new())
    }

    fn update(&self, lines: Vec<String>) -> TailUpdate {
        TailUpdate {
            channel: self.source.channel.clone(),
            lines,
            offset: self.offset().unwrap_or(0),
        }
    }

    /// Advance the state machine by one step.
    ///
    /// Returns `Some` when lines were read or the offset moved for another
    /// reason, `None` when nothing changed.
    pub async fn poll(&mut self) -> io::Result<Option<TailUpdate>> {
        match self.state {
            TailState::AwaitingFile => self.poll_missing().await,
            TailState::Streaming { offset, identity } => {
                self.poll_streaming(offset, identity).await
            }
        }
    }

    async fn poll_missing(&mut self) -> io::Result<Option<TailUpdate>> {
        match tokio::fs::metadata(self.source.path()).await {
            Ok(meta) => {
                tracing::info!(
                    channel = %self.source.channel(),
                    "log file appeared, following from end"
                );
                self.state = TailState::Streaming {
                    offset: meta.len(),
                    identity: FileIdentity::of(&meta),
                };
                Ok(Some(self.checkpoint()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn poll_streaming(
        &mut self,
        mut offset: u64,
        identity: Option<FileIdentity>,
    ) -> io::Result<Option<TailUpdate>> {
        let mut file = match tokio::fs::File::open(self.source.path()).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(
                    channel = %self.source.channel(),
                    "log file removed, waiting for it to reappear"
                );
                self.state = TailState::AwaitingFile;
                return Ok(Some(self.checkpoint()));
            }
            Err(e) => return Err(e),
        };
        let meta = file.metadata().await?;
        let current = FileIdentity::of(&meta);
        let len = meta.len();

        let mut reset = false;
        if len < offset || (identity.is_some() && current != identity) {
            tracing::info!(
                channel = %self.source.channel(),
                "log file truncated or replaced, restarting from start"
            );
            offset = 0;
            reset = true;
        }

        let mut lines = Vec::new();
        if len > offset {
            file.seek(io::SeekFrom::Start(offset)).await?;
            let mut buf = Vec::with_capacity((len - offset) as usize);
            (&mut file).take(len - offset).read_to_end(&mut buf).await?;
            offset += split_complete_lines(&buf, &mut lines) as u64;
        }

        self.state = TailState::Streaming {
            offset,
            identity: current,
        };
        if lines.is_empty() && !reset {
            return Ok(None);
        }
        Ok(Some(self.update(lines)))
    }

    /// Poll forever, publishing every update to `broadcaster`.
    ///
    /// Sleeps the short interval when caught up and the long one while the
    /// file is missing. Read errors are logged and retried.
    pub async fn run(mut self, broadcaster: Arc<Broadcaster>) {
        broadcaster.publish_tail(self.checkpoint());
        loop {
            let had_lines = match self.poll().await {
                Ok(Some(update)) => {
                    let had_lines = !update.lines.is_empty();
                    broadcaster.publish_tail(update);
                    had_lines
                }
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(channel = %self.source.channel(), error = %e, "log read failed");
                    false
                }
            };
            if had_lines {
                continue;
            }
            let pause = if self.is_streaming() {
                self.config.poll_interval
            } else {
                self.config.missing_interval
            };
            tokio::time::sleep(pause).await;
        }
    }

    pub fn spawn(self, broadcaster: Arc<Broadcaster>) -> JoinHandle<()> {
        tokio::spawn(self.run(broadcaster))
    }
}

/// Push every complete line of `bytes` into `out`, cleaned of `\r` and
/// terminal escapes. Returns the number of bytes consumed.
fn split_complete_lines(bytes: &[u8], out: &mut Vec<String>) -> usize {
    let Some(last_newline) = bytes.iter().rposition(|&b| b == b'\n') else {
        return 0;
    };
    let complete = &bytes[..last_newline];
    out.extend(complete.split(|&b| b == b'\n').map(clean_line));
    last_newline + 1
}

fn clean_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    strip_ansi(&text).into_owned()
}

/// Read the first `upto` bytes of `path` as cleaned history text.
///
/// A missing file is an empty history. A file shorter than `upto` (it was
/// truncated in the meantime) yields what is there.
pub async fn read_backlog(path: &Path, upto: u64) -> io::Result<String> {
    if upto == 0 {
        return Ok(String::new());
    }
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e),
    };
    let mut buf = Vec::new();
    file.take(upto).read_to_end(&mut buf).await?;

    let text = String::from_utf8_lossy(&buf);
    let text = text.replace("\r\n", "\n");
    Ok(strip_ansi(&text).into_owned())
}
