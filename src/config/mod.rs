//! Configuration management for the Qin bot
//!
//! Values are layered `env > TOML file > default`.

pub mod file;

use std::path::PathBuf;

use secrecy::SecretString;

use crate::music::MusicSettings;
use crate::{Error, Result};

use file::QinConfigFile;

/// Default speech command arguments (espeak-style)
const DEFAULT_TTS_ARGS: [&str; 3] = ["-w", "{output}", "{text}"];

/// Qin bot configuration
#[derive(Debug)]
pub struct Config {
    /// Discord bot token
    pub token: SecretString,

    /// Display name
    pub name: String,

    /// Path to data directory (database)
    pub data_dir: PathBuf,

    /// Music extension settings
    pub music: MusicSettings,

    /// External media tools
    pub media: MediaConfig,

    /// Speech synthesis, when configured
    pub tts: Option<TtsConfig>,
}

/// External media tool paths
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// yt-dlp executable
    pub ytdlp: PathBuf,

    /// ffmpeg executable
    pub ffmpeg: PathBuf,
}

/// Speech synthesis command
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Program to run
    pub program: String,

    /// Arguments with `{text}` and `{output}` placeholders
    pub args: Vec<String>,

    /// File the program writes audio to
    pub output: PathBuf,
}

/// Default data directory: `~/.local/share/qin` on Linux
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from(".qin"), |d| d.data_dir().join("qin"))
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no bot token is configured
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no bot token is configured
    pub fn from_sources(fc: QinConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = env("DISCORD_TOKEN")
            .or(fc.bot.token)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("Discord token is required (set DISCORD_TOKEN)".to_string())
            })?;

        let name = env("QIN_NAME")
            .or(fc.bot.name)
            .unwrap_or_else(|| "Qin".to_string());

        let data_dir = env("QIN_DATA_DIR")
            .map(PathBuf::from)
            .or(fc.bot.data_dir)
            .unwrap_or_else(default_data_dir);

        let defaults = MusicSettings::default();
        let volume = env("QIN_VOLUME")
            .and_then(|v| v.parse().ok())
            .or(fc.music.volume)
            .unwrap_or(defaults.volume);
        let music = MusicSettings {
            dj_role: env("QIN_DJ_ROLE")
                .or(fc.music.dj_role)
                .unwrap_or(defaults.dj_role),
            volume: volume.clamp(0.0, 2.0),
            logging: fc.music.logging.unwrap_or(defaults.logging),
        };

        let media = MediaConfig {
            ytdlp: env("QIN_YTDLP")
                .map(PathBuf::from)
                .or(fc.media.ytdlp)
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            ffmpeg: env("QIN_FFMPEG")
                .map(PathBuf::from)
                .or(fc.media.ffmpeg)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
        };

        let tts = env("QIN_TTS_PROGRAM")
            .or(fc.tts.program)
            .map(|program| TtsConfig {
                program,
                args: fc
                    .tts
                    .args
                    .unwrap_or_else(|| DEFAULT_TTS_ARGS.iter().map(ToString::to_string).collect()),
                output: fc
                    .tts
                    .output
                    .unwrap_or_else(|| data_dir.join("tts.wav")),
            });

        Ok(Self {
            token: SecretString::from(token),
            name,
            data_dir,
            music,
            media,
            tts,
        })
    }

    /// Path of the history database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("qin.db")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let result = Config::from_sources(QinConfigFile::default(), env(&[]));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = Config::from_sources(QinConfigFile::default(), env(&[("DISCORD_TOKEN", " ")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_sources(QinConfigFile::default(), env(&[("DISCORD_TOKEN", "abc")])).unwrap();

        assert_eq!(config.token.expose_secret(), "abc");
        assert_eq!(config.name, "Qin");
        assert_eq!(config.music.dj_role, "DJ");
        assert!((config.music.volume - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.media.ytdlp, PathBuf::from("yt-dlp"));
        assert!(config.tts.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = QinConfigFile::default();
        fc.bot.token = Some("from-file".to_string());
        fc.music.dj_role = Some("Muzyk".to_string());
        fc.tts.program = Some("espeak".to_string());

        let config = Config::from_sources(
            fc,
            env(&[
                ("DISCORD_TOKEN", "from-env"),
                ("QIN_DJ_ROLE", "Admin"),
                ("QIN_DATA_DIR", "/tmp/qin-test"),
            ]),
        )
        .unwrap();

        assert_eq!(config.token.expose_secret(), "from-env");
        assert_eq!(config.music.dj_role, "Admin");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/qin-test/qin.db"));

        let tts = config.tts.unwrap();
        assert_eq!(tts.program, "espeak");
        assert_eq!(tts.args, vec!["-w", "{output}", "{text}"]);
        assert_eq!(tts.output, PathBuf::from("/tmp/qin-test/tts.wav"));
    }

    #[test]
    fn test_file_token_is_used_without_env() {
        let mut fc = QinConfigFile::default();
        fc.bot.token = Some("from-file".to_string());

        let config = Config::from_sources(fc, env(&[])).unwrap();
        assert_eq!(config.token.expose_secret(), "from-file");
    }
}
