//! TOML configuration file loading
//!
//! Supports `~/.config/kindly/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::persona::SongRequest;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KindlyConfigFile {
    /// Gemini API key
    pub api_key: Option<String>,

    /// Live session configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// News digest configuration
    #[serde(default)]
    pub news: NewsFileConfig,

    /// Music configuration
    #[serde(default)]
    pub music: MusicFileConfig,
}

/// Live session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Live model identifier
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Zephyr")
    pub voice: Option<String>,

    /// WebSocket endpoint override
    pub endpoint: Option<String>,
}

/// News digest configuration
#[derive(Debug, Default, Deserialize)]
pub struct NewsFileConfig {
    /// Text model used for the digest
    pub model: Option<String>,

    /// REST API base override
    pub api_base: Option<String>,
}

/// Music configuration
#[derive(Debug, Default, Deserialize)]
pub struct MusicFileConfig {
    /// Seconds the opening song plays
    pub preroll_secs: Option<u64>,

    /// Catalogue country for the opening song ("" disables the hint)
    pub country: Option<String>,

    /// Search endpoint override
    pub search_url: Option<String>,

    /// Replacement opening playlist
    pub playlist: Option<Vec<SongRequest>>,
}

/// Load the TOML config file from the standard path
///
/// Returns `KindlyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> KindlyConfigFile {
    config_file_path().map_or_else(KindlyConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`
///
/// Missing or invalid files fall back to defaults with a warning.
pub fn load_config_from(path: &Path) -> KindlyConfigFile {
    if !path.exists() {
        return KindlyConfigFile::default();
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
                KindlyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            KindlyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/kindly/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("kindly").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_partial_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[live]
voice = "Puck"

[music]
preroll_secs = 5
playlist = [{{ artist = "Dingo", song = "Autiotalo" }}]
"#
        )
        .unwrap();

        let config = load_config_from(file.path());
        assert_eq!(config.live.voice.as_deref(), Some("Puck"));
        assert!(config.live.model.is_none());
        assert_eq!(config.music.preroll_secs, Some(5));
        assert_eq!(config.music.playlist.unwrap()[0].song, "Autiotalo");
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "live = [not valid").unwrap();
        let config = load_config_from(file.path());
        assert!(config.api_key.is_none());
        assert!(config.live.voice.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.toml"));
        assert!(config.news.model.is_none());
    }
}
