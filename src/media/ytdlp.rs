//! Track resolution via the `yt-dlp` CLI

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{MediaResolver, MediaStream, TrackInfo, Transcoder};
use crate::{Error, Result};

/// Subset of `yt-dlp --dump-single-json` output we care about
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    is_live: Option<bool>,
}

/// Resolves tracks with `yt-dlp` and decodes them with ffmpeg
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: PathBuf,
    transcoder: Transcoder,
}

impl YtDlpResolver {
    /// Create a resolver using the given binaries
    ///
    /// Missing binaries are only logged; resolution then fails per request.
    #[must_use]
    pub fn new(program: PathBuf, ffmpeg: PathBuf) -> Self {
        for bin in [&program, &ffmpeg] {
            if which::which(bin).is_err() {
                tracing::warn!(program = %bin.display(), "binary not found on PATH");
            }
        }

        Self {
            program,
            transcoder: Transcoder::new(ffmpeg),
        }
    }

    /// Run yt-dlp and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Resolution(format!("failed to spawn yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(Error::Resolution(format!(
                "yt-dlp exited with code {code}: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<TrackInfo> {
        let stdout = self
            .run(&["--dump-single-json", "--no-playlist", "--no-warnings", url])
            .await?;

        parse_info(&stdout)
    }

    async fn open_stream(&self, url: &str) -> Result<MediaStream> {
        let stdout = self
            .run(&["-f", "bestaudio/best", "--get-url", "--no-playlist", url])
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;

        let direct = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| Error::Stream(format!("no stream url for {url}")))?;

        self.transcoder.open(direct)
    }
}

/// Parse the JSON document printed by `--dump-single-json`
fn parse_info(json: &str) -> Result<TrackInfo> {
    let info: YtDlpInfo = serde_json::from_str(json)
        .map_err(|e| Error::Resolution(format!("unexpected yt-dlp output: {e}")))?;

    let title = info
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::Resolution("track has no title".to_string()))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let duration_secs = if info.is_live.unwrap_or(false) {
        0
    } else {
        info.duration.map_or(0, |d| d.max(0.0).round() as u64)
    };

    Ok(TrackInfo {
        title,
        duration_secs,
    })
}
