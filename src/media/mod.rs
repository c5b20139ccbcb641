//! Media resolution and audio streams
//!
//! Turns a track URL into metadata and a raw PCM stream that a voice
//! connection can play. Streams are signed 16-bit little-endian mono
//! samples at [`SAMPLE_RATE`].

mod ytdlp;

use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, Command};

pub use ytdlp::YtDlpResolver;

use crate::{Error, Result};

/// Sample rate of every [`MediaStream`] (matches Discord voice)
pub const SAMPLE_RATE: u32 = 48_000;

/// Metadata for a resolved track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track title
    pub title: String,

    /// Length in whole seconds (0 for live streams)
    pub duration_secs: u64,
}

/// Resolves track URLs into metadata and playable streams
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Fetch track metadata
    ///
    /// # Errors
    ///
    /// Returns `Error::Resolution` if the URL is not playable
    async fn resolve(&self, url: &str) -> Result<TrackInfo>;

    /// Open a PCM stream for the track
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the stream cannot be opened
    async fn open_stream(&self, url: &str) -> Result<MediaStream>;
}

/// Check that `input` is an absolute http(s) URL
///
/// # Errors
///
/// Returns `Error::Resolution` for anything else
pub fn validate_url(input: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(input)
        .map_err(|e| Error::Resolution(format!("invalid url {input}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::Resolution(format!(
            "unsupported url scheme: {scheme}"
        ))),
    }
}

/// Raw PCM audio stream
///
/// Owns the producing process (if any); dropping the stream kills it.
pub struct MediaStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    process: Option<Child>,
}

impl MediaStream {
    /// Wrap an in-memory or otherwise pre-opened reader
    #[must_use]
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            process: None,
        }
    }

    /// Wrap a spawned process, reading PCM from its stdout
    ///
    /// # Errors
    ///
    /// Returns error if the process was spawned without a piped stdout
    pub fn from_process(mut child: Child) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Stream("process stdout not captured".to_string()))?;

        Ok(Self {
            reader: Box::new(stdout),
            process: Some(child),
        })
    }
}

impl AsyncRead for MediaStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("process", &self.process.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

/// Decodes arbitrary audio inputs to PCM with ffmpeg
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
}

impl Transcoder {
    /// Create a transcoder using the given ffmpeg binary
    #[must_use]
    pub const fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Start decoding `input` (a URL or file path)
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if ffmpeg cannot be spawned
    pub fn open(&self, input: &str) -> Result<MediaStream> {
        let child = Command::new(&self.program)
            .args(Self::args(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Stream(format!("failed to spawn ffmpeg: {e}")))?;

        tracing::debug!(input, "transcoder started");
        MediaStream::from_process(child)
    }

    fn args(input: &str) -> Vec<String> {
        let rate = SAMPLE_RATE.to_string();
        [
            "-nostdin", "-loglevel", "error", "-i", input, "-f", "s16le", "-ac", "1", "-ar", rate.as_str(),
            "pipe:1",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }
}

/// Render a track length as `m:ss` or `h:mm:ss`
#[must_use]
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
