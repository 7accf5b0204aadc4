//! Conversation transcript

use serde::{Deserialize, Serialize};

/// Who said something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The listener
    User,
    /// Kindly
    Model,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "You"),
            Self::Model => write!(f, "Kindly"),
        }
    }
}

/// One finished utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Who spoke
    pub speaker: Speaker,
    /// What was said
    pub text: String,
}

/// Accumulates transcription deltas for the turn in progress
#[derive(Debug, Clone, Default)]
pub struct TurnTranscript {
    input: String,
    output: String,
}

impl TurnTranscript {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta of the listener's speech
    pub fn push_input(&mut self, delta: &str) {
        self.input.push_str(delta);
    }

    /// Append a delta of Kindly's speech
    pub fn push_output(&mut self, delta: &str) {
        self.output.push_str(delta);
    }

    /// Listener text so far
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Kindly's text so far
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Close the turn
    ///
    /// Returns the user message (if any) before the model message (if any).
    /// Whitespace-only text produces no message; the accumulators are
    /// emptied either way.
    pub fn flush(&mut self) -> Vec<TranscriptMessage> {
        let input = std::mem::take(&mut self.input);
        let output = std::mem::take(&mut self.output);

        [(Speaker::User, input), (Speaker::Model, output)]
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(speaker, text)| TranscriptMessage { speaker, text })
            .collect()
    }

    /// Drop any partial text
    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}
