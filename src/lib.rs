//! Kindly - a voice companion styled as a friendly radio host
//!
//! This library provides the pieces of the companion:
//! - Voice processing (microphone capture, PCM codec, gapless speech playback, music previews)
//! - The Gemini Live session transport
//! - Tools the model can call (music, news)
//! - The session orchestrator and its terminal presenter
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Console (status, transcript)          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ UiEvent / Command
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Companion                        │
//! │  Capture  │  Playback  │  Tools  │  Music  │  Persona │
//! └────────────────────┬────────────────────────────────┘
//!                      │ SessionEvent / ClientMessage
//! ┌────────────────────▼────────────────────────────────┐
//! │               Gemini Live (WebSocket)                │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod companion;
pub mod config;
pub mod console;
pub mod error;
pub mod live;
pub mod persona;
pub mod tools;
pub mod transcript;
pub mod voice;

pub use companion::{
    AudioBackend, Command, Companion, CompanionDeps, CompanionEvent, CompanionSettings,
    CpalBackend, Phase,
};
pub use config::Config;
pub use console::{Console, StatusLine, UiEvent};
pub use error::{Error, Result};
pub use live::{GeminiLive, LiveConnector, SessionEvent, SessionHandle};
pub use tools::{GeminiNews, ITunesSearch, MusicSearch, NewsSource, NowPlaying, ToolDispatcher};
pub use transcript::{Speaker, TranscriptMessage, TurnTranscript};
