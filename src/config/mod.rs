//! Configuration management for Kindly
//!
//! Values come from the optional TOML file, then environment variables,
//! which take precedence.

pub mod file;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::companion::{DEFAULT_LIVE_MODEL, DEFAULT_MUSIC_COUNTRY, DEFAULT_PREROLL, DEFAULT_VOICE};
use crate::live::DEFAULT_ENDPOINT;
use crate::persona::{SongRequest, default_playlist};
use crate::tools::{DEFAULT_API_BASE, DEFAULT_SEARCH_URL};
use crate::{Error, Result};

use self::file::KindlyConfigFile;

/// Default text model for the news digest
pub const DEFAULT_NEWS_MODEL: &str = "gemini-2.5-flash";

/// Kindly configuration
#[derive(Debug)]
pub struct Config {
    /// Gemini API key (`GEMINI_API_KEY` or `API_KEY`)
    api_key: SecretString,

    /// Live model identifier
    pub live_model: String,

    /// Live WebSocket endpoint
    pub live_endpoint: String,

    /// Prebuilt voice name
    pub voice: String,

    /// Text model for the news digest
    pub news_model: String,

    /// REST API base for the news digest
    pub api_base: String,

    /// Music search endpoint
    pub search_url: String,

    /// How long the opening song plays
    pub preroll: Duration,

    /// Catalogue country for the opening song
    pub music_country: Option<String>,

    /// Opening song playlist
    pub playlist: Vec<SongRequest>,
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns `Config` error if no API key is set or a value is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Assemble configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Config` error if no API key is set or a value is invalid
    pub fn from_sources(
        fc: KindlyConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.api_key)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "GEMINI_API_KEY (or API_KEY) not set; add it to the environment or api_key to config.toml"
                        .to_string(),
                )
            })?;

        let preroll = match env("KINDLY_PREROLL_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|e| {
                Error::Config(format!("KINDLY_PREROLL_SECS must be whole seconds: {e}"))
            })?),
            None => fc
                .music
                .preroll_secs
                .map_or(DEFAULT_PREROLL, Duration::from_secs),
        };

        let music_country = env("KINDLY_MUSIC_COUNTRY")
            .or(fc.music.country)
            .map_or_else(|| Some(DEFAULT_MUSIC_COUNTRY.to_string()), |c| {
                let c = c.trim().to_string();
                (!c.is_empty()).then_some(c)
            });

        let playlist = fc
            .music
            .playlist
            .filter(|songs| !songs.is_empty())
            .unwrap_or_else(default_playlist);

        Ok(Self {
            api_key: SecretString::from(api_key),
            live_model: env("KINDLY_LIVE_MODEL")
                .or(fc.live.model)
                .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            live_endpoint: fc
                .live
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            voice: env("KINDLY_VOICE")
                .or(fc.live.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            news_model: env("KINDLY_NEWS_MODEL")
                .or(fc.news.model)
                .unwrap_or_else(|| DEFAULT_NEWS_MODEL.to_string()),
            api_base: fc
                .news
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            search_url: fc
                .music
                .search_url
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            preroll,
            music_country,
            playlist,
        })
    }

    /// A fresh handle to the API key
    #[must_use]
    pub fn api_key(&self) -> SecretString {
        SecretString::from(self.api_key.expose_secret().to_string())
    }
}
