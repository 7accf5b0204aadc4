//! Tools the live model can call
//!
//! Each call maps to exactly one spoken-style result. Collaborator failures
//! are turned into apologies here and never reach the session as faults.
//! Side effects on the music player are returned as a [`ToolEffect`] for the
//! session owner to apply.

mod music;
mod news;

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;

use crate::live::{FunctionCall, FunctionDeclaration, FunctionResponse};

pub use music::{DEFAULT_SEARCH_URL, ITunesSearch, MusicSearch, NowPlaying, Track};
pub use news::{DEFAULT_API_BASE, GeminiNews, NewsSource};

/// Tool name for playing a song
pub const PLAY_MUSIC: &str = "playMusic";
/// Tool name for stopping music
pub const STOP_MUSIC: &str = "stopMusic";
/// Tool name for reading headlines
pub const GET_NEWS_HEADLINES: &str = "getNewsHeadlines";

const DEFAULT_SONG: &str = "a lovely tune";
const DEFAULT_ARTIST: &str = "an unknown artist";

/// Declarations for every tool this dispatcher understands
#[must_use]
pub fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: PLAY_MUSIC.to_string(),
            description: "Plays a requested song for the user.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "song": {"type": "string", "description": "The name of the song to play."},
                    "artist": {"type": "string", "description": "The artist of the song."}
                },
                "required": ["song", "artist"]
            }),
        },
        FunctionDeclaration {
            name: STOP_MUSIC.to_string(),
            description: "Stops the currently playing music.".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        FunctionDeclaration {
            name: GET_NEWS_HEADLINES.to_string(),
            description: "Fetches and reads the latest world news headlines.".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]
}

/// Side effect requested by a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEffect {
    /// Nothing to change
    None,
    /// Start playing a track and show it as now playing
    Play(Track),
    /// Stop the music and clear now playing
    StopMusic,
}

/// Finished tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Call id to answer
    pub id: Option<String>,
    /// Tool name to answer
    pub name: String,
    /// Result text for the model
    pub result: String,
    /// Status line to show once done
    pub status: Option<String>,
    /// Effect to apply
    pub effect: ToolEffect,
}

impl ToolOutcome {
    fn new(call: &FunctionCall, result: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result: result.into(),
            status: None,
            effect: ToolEffect::None,
        }
    }

    fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    fn with_effect(mut self, effect: ToolEffect) -> Self {
        self.effect = effect;
        self
    }

    /// The payload sent back to the model
    #[must_use]
    pub fn response(&self) -> FunctionResponse {
        FunctionResponse::new(self.id.clone(), self.name.clone(), self.result.clone())
    }
}

fn string_arg(call: &FunctionCall, key: &str, default: &str) -> String {
    call.args
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Maps tool calls to collaborator requests
#[derive(Clone)]
pub struct ToolDispatcher {
    search: Arc<dyn MusicSearch>,
    news: Arc<dyn NewsSource>,
}

impl ToolDispatcher {
    /// Create a dispatcher over the music and news collaborators
    #[must_use]
    pub fn new(search: Arc<dyn MusicSearch>, news: Arc<dyn NewsSource>) -> Self {
        Self { search, news }
    }

    /// Status to show while `call` runs
    #[must_use]
    pub fn status_for(call: &FunctionCall) -> Option<String> {
        match call.name.as_str() {
            PLAY_MUSIC => {
                let song = string_arg(call, "song", DEFAULT_SONG);
                let artist = string_arg(call, "artist", DEFAULT_ARTIST);
                Some(format!("Searching for \"{song}\" by {artist}..."))
            }
            GET_NEWS_HEADLINES => Some("Looking up the latest headlines...".to_string()),
            _ => None,
        }
    }

    /// Run one tool call
    ///
    /// The returned future owns everything it needs, so several calls can be
    /// in flight while the session keeps streaming.
    #[must_use]
    pub fn execute(&self, call: FunctionCall) -> BoxFuture<'static, ToolOutcome> {
        let dispatcher = self.clone();
        async move {
            tracing::info!(tool = %call.name, id = ?call.id, "tool call");
            let outcome = match call.name.as_str() {
                PLAY_MUSIC => dispatcher.play_music(&call).await,
                STOP_MUSIC => ToolOutcome::new(&call, "I've stopped the music.")
                    .with_status("Music stopped. Speak whenever you like.")
                    .with_effect(ToolEffect::StopMusic),
                GET_NEWS_HEADLINES => dispatcher.news_headlines(&call).await,
                other => {
                    tracing::warn!(tool = other, "unknown tool requested");
                    ToolOutcome::new(&call, "Unknown function call.")
                }
            };
            tracing::debug!(tool = %outcome.name, result = %outcome.result, "tool finished");
            outcome
        }
        .boxed()
    }

    async fn play_music(&self, call: &FunctionCall) -> ToolOutcome {
        let song = string_arg(call, "song", DEFAULT_SONG);
        let artist = string_arg(call, "artist", DEFAULT_ARTIST);

        match self.search.search(&song, &artist, None).await {
            Ok(Some(track)) => {
                let result = format!("Now playing \"{}\" by {}.", track.name, track.artist);
                ToolOutcome::new(call, result).with_effect(ToolEffect::Play(track))
            }
            Ok(None) => ToolOutcome::new(
                call,
                format!(
                    "I'm sorry, I couldn't find \"{song}\" by {artist}. Would you like to try another?"
                ),
            )
            .with_status(format!("Could not find \"{song}\".")),
            Err(e) => {
                tracing::warn!(error = %e, song, artist, "music search failed");
                ToolOutcome::new(
                    call,
                    "I'm having trouble connecting to the music library right now.",
                )
                .with_status("Error finding music.")
            }
        }
    }

    async fn news_headlines(&self, call: &FunctionCall) -> ToolOutcome {
        match self.news.headlines().await {
            Ok(summary) => ToolOutcome::new(call, summary).with_status("Here's the latest news."),
            Err(e) => {
                tracing::warn!(error = %e, "news fetch failed");
                ToolOutcome::new(
                    call,
                    "I'm sorry, I'm having trouble fetching the news right now. Please try again in a moment.",
                )
                .with_status("Here's the latest news.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::{Error, Result};

    struct FixedSearch(Option<Track>);

    #[async_trait]
    impl MusicSearch for FixedSearch {
        async fn search(&self, _: &str, _: &str, _: Option<&str>) -> Result<Option<Track>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl MusicSearch for BrokenSearch {
        async fn search(&self, _: &str, _: &str, _: Option<&str>) -> Result<Option<Track>> {
            Err(Error::Collaborator("catalogue offline".to_string()))
        }
    }

    struct FixedNews(Option<&'static str>);

    #[async_trait]
    impl NewsSource for FixedNews {
        async fn headlines(&self) -> Result<String> {
            self.0
                .map(ToString::to_string)
                .ok_or_else(|| Error::Collaborator("no news".to_string()))
        }
    }

    fn dispatcher(search: impl MusicSearch + 'static, news: FixedNews) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(search), Arc::new(news))
    }

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: Some("call-7".to_string()),
            name: name.to_string(),
            args,
        }
    }

    fn track() -> Track {
        Track {
            name: "Rappiolla".to_string(),
            artist: "Hassisen Kone".to_string(),
            preview_url: "https://example.test/r.m4a".to_string(),
        }
    }

    #[tokio::test]
    async fn play_music_hit_requests_playback() {
        let tools = dispatcher(FixedSearch(Some(track())), FixedNews(None));
        let outcome = tools
            .execute(call(PLAY_MUSIC, json!({"song": "Rappiolla", "artist": "Hassisen Kone"})))
            .await;

        assert_eq!(outcome.result, "Now playing \"Rappiolla\" by Hassisen Kone.");
        assert_eq!(outcome.effect, ToolEffect::Play(track()));
        assert_eq!(outcome.id.as_deref(), Some("call-7"));
    }

    #[tokio::test]
    async fn play_music_miss_apologises_without_effect() {
        let tools = dispatcher(FixedSearch(None), FixedNews(None));
        let outcome = tools
            .execute(call(PLAY_MUSIC, json!({"song": "Nothing", "artist": "Nobody"})))
            .await;

        assert!(outcome.result.contains("sorry"));
        assert!(outcome.result.contains("\"Nothing\" by Nobody"));
        assert_eq!(outcome.effect, ToolEffect::None);
        assert_eq!(outcome.status.as_deref(), Some("Could not find \"Nothing\"."));
    }

    #[tokio::test]
    async fn play_music_failure_is_spoken() {
        let tools = dispatcher(BrokenSearch, FixedNews(None));
        let outcome = tools.execute(call(PLAY_MUSIC, Value::Null)).await;
        assert!(outcome.result.contains("trouble connecting to the music library"));
        assert_eq!(outcome.effect, ToolEffect::None);
    }

    #[test]
    fn play_music_defaults_missing_arguments() {
        let status = ToolDispatcher::status_for(&call(PLAY_MUSIC, json!({})));
        assert_eq!(
            status.as_deref(),
            Some("Searching for \"a lovely tune\" by an unknown artist...")
        );
    }

    #[tokio::test]
    async fn stop_music_confirms() {
        let tools = dispatcher(FixedSearch(None), FixedNews(None));
        let outcome = tools.execute(call(STOP_MUSIC, json!({}))).await;
        assert_eq!(outcome.result, "I've stopped the music.");
        assert_eq!(outcome.effect, ToolEffect::StopMusic);
    }

    #[tokio::test]
    async fn news_success_and_failure() {
        let ok = dispatcher(FixedSearch(None), FixedNews(Some("Headlines tonight.")));
        assert_eq!(
            ok.execute(call(GET_NEWS_HEADLINES, json!({}))).await.result,
            "Headlines tonight."
        );

        let failing = dispatcher(FixedSearch(None), FixedNews(None));
        let outcome = failing.execute(call(GET_NEWS_HEADLINES, json!({}))).await;
        assert!(outcome.result.starts_with("I'm sorry"));
    }

    #[tokio::test]
    async fn unknown_tool_still_answers() {
        let tools = dispatcher(FixedSearch(None), FixedNews(None));
        let outcome = tools.execute(call("launchRocket", json!({}))).await;
        assert_eq!(outcome.result, "Unknown function call.");
        assert_eq!(outcome.response().name, "launchRocket");
    }

    #[test]
    fn declarations_cover_every_tool() {
        let names: Vec<_> = tool_declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![PLAY_MUSIC, STOP_MUSIC, GET_NEWS_HEADLINES]);
    }
}
