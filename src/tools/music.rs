//! Music search
//!
//! Finds a playable preview for a song/artist pair.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default search endpoint
pub const DEFAULT_SEARCH_URL: &str = "https://itunes.apple.com/search";

/// Best match returned by a music search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Track title as listed by the catalogue
    pub name: String,
    /// Artist as listed by the catalogue
    pub artist: String,
    /// URL of a short playable preview
    pub preview_url: String,
}

/// What is currently audible on the music player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    /// Song title
    pub song: String,
    /// Artist
    pub artist: String,
}

impl From<&Track> for NowPlaying {
    fn from(track: &Track) -> Self {
        Self {
            song: track.name.clone(),
            artist: track.artist.clone(),
        }
    }
}

/// Looks up playable tracks
#[async_trait]
pub trait MusicSearch: Send + Sync {
    /// Find the best match for `song` by `artist`
    ///
    /// `country` narrows the catalogue (two-letter store code).
    ///
    /// # Errors
    ///
    /// Returns `Collaborator` or `Http` errors when the lookup fails; a
    /// successful lookup without a match is `Ok(None)`
    async fn search(&self, song: &str, artist: &str, country: Option<&str>)
    -> Result<Option<Track>>;
}

/// iTunes Search API client
pub struct ITunesSearch {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    result_count: usize,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    track_name: Option<String>,
    artist_name: Option<String>,
    preview_url: Option<String>,
}

impl ITunesSearch {
    /// Create a client against `base_url`
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn query_url(&self, song: &str, artist: &str, country: Option<&str>) -> String {
        let mut url = format!(
            "{}?term={}+{}&entity=song&limit=1",
            self.base_url,
            urlencoding::encode(song),
            urlencoding::encode(artist)
        );
        if let Some(country) = country {
            url.push_str("&country=");
            url.push_str(&urlencoding::encode(country));
        }
        url
    }
}

fn best_match(response: SearchResponse) -> Option<Track> {
    if response.result_count == 0 {
        return None;
    }
    response.results.into_iter().find_map(|r| {
        Some(Track {
            name: r.track_name?,
            artist: r.artist_name?,
            preview_url: r.preview_url?,
        })
    })
}

#[async_trait]
impl MusicSearch for ITunesSearch {
    async fn search(
        &self,
        song: &str,
        artist: &str,
        country: Option<&str>,
    ) -> Result<Option<Track>> {
        let url = self.query_url(song, artist, country);
        tracing::debug!(song, artist, ?country, "searching music catalogue");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Collaborator(format!(
                "music search returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await?;
        let track = best_match(body);
        tracing::debug!(found = track.is_some(), "music search complete");
        Ok(track)
    }
}
