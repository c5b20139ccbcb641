//! TOML configuration file loading
//!
//! Supports `~/.config/qin/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct QinConfigFile {
    /// Bot identity
    #[serde(default)]
    pub bot: BotFileConfig,

    /// Music extension settings
    #[serde(default)]
    pub music: MusicFileConfig,

    /// External media tools
    #[serde(default)]
    pub media: MediaFileConfig,

    /// Text-to-speech command
    #[serde(default)]
    pub tts: TtsFileConfig,
}

/// Bot identity configuration
#[derive(Debug, Default, Deserialize)]
pub struct BotFileConfig {
    /// Discord bot token
    pub token: Option<String>,

    /// Display name
    pub name: Option<String>,

    /// Data directory (database)
    pub data_dir: Option<PathBuf>,
}

/// Music extension configuration
#[derive(Debug, Default, Deserialize)]
pub struct MusicFileConfig {
    /// Role required for playback commands (e.g. "DJ")
    pub dj_role: Option<String>,

    /// Playback volume, 1.0 = unchanged
    pub volume: Option<f32>,

    /// Log informational chatter
    pub logging: Option<bool>,
}

/// Media tool paths
#[derive(Debug, Default, Deserialize)]
pub struct MediaFileConfig {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

/// Speech synthesis command (e.g. `program = "espeak"`, `args = ["-w", "{output}", "{text}"]`)
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub output: Option<PathBuf>,
}

/// Load the TOML config file from the standard path
///
/// Returns `QinConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> QinConfigFile {
    config_file_path().map_or_else(QinConfigFile::default, |path| load_config_file_from(&path))
}

/// Load the TOML config file at `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> QinConfigFile {
    if !path.exists() {
        return QinConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                QinConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            QinConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/qin/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("qin").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file_from(&dir.path().join("config.toml"));
        assert!(fc.bot.token.is_none());
        assert!(fc.music.dj_role.is_none());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[bot]
name = "Qin"

[music]
dj_role = "Muzyk"
volume = 0.8

[tts]
program = "espeak"
args = ["-w", "{output}", "{text}"]
"#,
        )
        .unwrap();

        let fc = load_config_file_from(&path);
        assert_eq!(fc.bot.name.as_deref(), Some("Qin"));
        assert_eq!(fc.music.dj_role.as_deref(), Some("Muzyk"));
        assert_eq!(fc.music.volume, Some(0.8));
        assert_eq!(fc.tts.args.unwrap().len(), 3);
        assert!(fc.media.ffmpeg.is_none());
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[music\nvolume = ").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.music.volume.is_none());
    }
}
