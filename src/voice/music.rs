//! Music playback for song previews

use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::codec::PlaybackBuffer;
use super::decode::decode_preview;
use super::mixer::{AudioOutput, VoiceId};
use super::resample::resample_buffer;
use crate::Result;

/// Plays one music track at a time
#[async_trait]
pub trait MusicPlayer: Send + Sync {
    /// Load `url` and start playing it, replacing any current track
    ///
    /// Resolves once audio has started.
    ///
    /// # Errors
    ///
    /// Returns error if the track cannot be fetched, decoded or started
    async fn play(&self, url: &str) -> Result<()>;

    /// Stop the current track; no-op when nothing plays
    fn stop(&self);
}

/// Downloads previews over HTTP and plays them on a dedicated output
pub struct PreviewPlayer {
    client: reqwest::Client,
    output: Box<dyn AudioOutput>,
    current: Mutex<Option<VoiceId>>,
    generation: AtomicU64,
}

impl PreviewPlayer {
    /// Create a player on `output`
    #[must_use]
    pub fn new(client: reqwest::Client, output: Box<dyn AudioOutput>) -> Self {
        Self {
            client,
            output,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<VoiceId>> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Invalidate pending plays and stop the current voice
    ///
    /// Returns the new generation.
    fn supersede(&self) -> u64 {
        let mut current = self.current();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(voice) = current.take() {
            self.output.stop_voice(voice);
            tracing::debug!(voice = voice.0, "music voice stopped");
        }
        generation
    }

    /// Start `buffer` unless `generation` was superseded
    ///
    /// The check, the start and the bookkeeping happen under one lock, so a
    /// concurrent [`MusicPlayer::stop`] either prevents the start or stops
    /// the voice it started.
    fn start_if_current(&self, generation: u64, buffer: &PlaybackBuffer) -> Option<VoiceId> {
        let mut current = self.current();
        if self.generation.load(Ordering::SeqCst) != generation {
            return None;
        }
        let voice = self.output.start_voice(buffer, self.output.current_time());
        *current = Some(voice);
        Some(voice)
    }
}

#[async_trait]
impl MusicPlayer for PreviewPlayer {
    async fn play(&self, url: &str) -> Result<()> {
        let generation = self.supersede();

        tracing::debug!(url, "fetching music preview");
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let rate = self.output.sample_rate();
        let buffer = tokio::task::spawn_blocking(move || {
            let decoded = decode_preview(&bytes)?;
            resample_buffer(&decoded, rate)
        })
        .await
        .map_err(|e| crate::Error::Audio(format!("decode task failed: {e}")))??;

        if self.start_if_current(generation, &buffer).is_none() {
            // A stop or newer play arrived while loading
            tracing::debug!(url, "preview superseded before playback");
            return Ok(());
        }

        tracing::info!(
            url,
            seconds = buffer.duration(),
            "music preview playing"
        );
        Ok(())
    }

    fn stop(&self) {
        self.supersede();
    }
}

impl Drop for PreviewPlayer {
    fn drop(&mut self) {
        self.output.close();
    }
}
