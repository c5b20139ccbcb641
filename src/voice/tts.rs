//! Text-to-speech (TTS) via an external synthesis program

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::media::{MediaStream, Transcoder};
use crate::{Error, Result};

/// Synthesizes speech into a playable stream
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`
    ///
    /// # Errors
    ///
    /// Returns `Error::Tts` if synthesis fails
    async fn speak(&self, text: &str) -> Result<MediaStream>;
}

/// Runs a configured command that writes speech to a fixed output file
///
/// Arguments may contain `{text}` and `{output}` placeholders, e.g.
/// `espeak -w {output} {text}`.
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    output: PathBuf,
    transcoder: Transcoder,
}

impl CommandSpeech {
    /// Create a new command-backed synthesizer
    #[must_use]
    pub const fn new(
        program: String,
        args: Vec<String>,
        output: PathBuf,
        transcoder: Transcoder,
    ) -> Self {
        Self {
            program,
            args,
            output,
            transcoder,
        }
    }

    /// Substitute placeholders in the argument template
    fn render_args(&self, text: &str) -> Vec<String> {
        let output = self.output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{output}", &output).replace("{text}", text))
            .collect()
    }

    /// Run the synthesis program, leaving audio at the output path
    async fn synthesize(&self, text: &str) -> Result<()> {
        match tokio::fs::remove_file(&self.output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Tts(format!(
                    "cannot clear {}: {e}",
                    self.output.display()
                )));
            }
        }

        let output = Command::new(&self.program)
            .args(self.render_args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Tts(format!("failed to spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tts(format!(
                "{} exited with code {code}: {}",
                self.program,
                stderr.trim()
            )));
        }

        if !self.output.exists() {
            return Err(Error::Tts(format!(
                "{} produced no audio at {}",
                self.program,
                self.output.display()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSpeech {
    async fn speak(&self, text: &str) -> Result<MediaStream> {
        self.synthesize(text).await?;
        tracing::debug!(chars = text.len(), output = %self.output.display(), "speech synthesized");
        self.transcoder
            .open(&self.output.to_string_lossy())
            .map_err(|e| Error::Tts(e.to_string()))
    }
}
