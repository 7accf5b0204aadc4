//! Gapless scheduling of streamed speech
//!
//! Every chunk is queued to begin exactly where the previous one ends:
//! `start = max(next_start_time, clock)`, then `next_start_time = start + duration`.
//!
//! When the output cannot run at 24 kHz, chunks go through one streaming
//! resampler so chunk edges stay continuous. The resampler holds back a few
//! milliseconds of audio; [`PlaybackScheduler::flush`] releases them at the
//! end of a turn.

use std::collections::HashSet;

use super::codec::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE, PlaybackBuffer, build_playback_buffer};
use super::mixer::{AudioOutput, VoiceId};
use super::resample::ChunkResampler;

/// Where and when a chunk was placed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    /// Voice playing the chunk
    pub voice: VoiceId,
    /// Output clock time the chunk starts at
    pub start_at: f64,
    /// Length of the chunk in seconds
    pub duration: f64,
}

/// Schedules decoded PCM chunks back to back on an output
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    resampler: Option<ChunkResampler>,
    next_start_time: f64,
    active: HashSet<VoiceId>,
}

impl PlaybackScheduler {
    /// Schedule onto `output`
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let rate = output.sample_rate();
        let resampler = if rate == OUTPUT_SAMPLE_RATE {
            None
        } else {
            match ChunkResampler::new(OUTPUT_SAMPLE_RATE, rate) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    tracing::warn!(error = %e, rate, "speech resampler unavailable, converting per chunk");
                    None
                }
            }
        };

        Self {
            output,
            resampler,
            next_start_time: 0.0,
            active: HashSet::new(),
        }
    }

    /// Queue a chunk of 24 kHz mono PCM after everything already queued
    pub fn schedule(&mut self, chunk: &[u8]) -> ScheduledChunk {
        let buffer = build_playback_buffer(chunk, OUTPUT_SAMPLE_RATE, OUTPUT_CHANNELS);
        let buffer = match &mut self.resampler {
            Some(resampler) => {
                let mut samples = Vec::new();
                resampler.push(&buffer.to_mono(), &mut samples);
                PlaybackBuffer::mono(self.output.sample_rate(), samples)
            }
            None => buffer,
        };
        self.place(&buffer)
    }

    /// Queue whatever the resampler still holds
    ///
    /// Returns `None` when nothing was pending.
    pub fn flush(&mut self) -> Option<ScheduledChunk> {
        let resampler = self.resampler.as_mut()?;
        let mut samples = Vec::new();
        resampler.flush(&mut samples);
        if samples.is_empty() {
            return None;
        }
        let buffer = PlaybackBuffer::mono(self.output.sample_rate(), samples);
        Some(self.place(&buffer))
    }

    fn place(&mut self, buffer: &PlaybackBuffer) -> ScheduledChunk {
        let start_at = self.next_start_time.max(self.output.current_time());
        let duration = buffer.duration();

        let voice = self.output.start_voice(buffer, start_at);
        self.active.insert(voice);
        self.next_start_time = start_at + duration;

        tracing::trace!(
            voice = voice.0,
            start_at,
            duration,
            queued = self.active.len(),
            "scheduled speech chunk"
        );

        ScheduledChunk {
            voice,
            start_at,
            duration,
        }
    }

    /// Forget a voice that finished on its own
    ///
    /// Returns whether the voice belonged to this scheduler.
    pub fn on_voice_ended(&mut self, voice: VoiceId) -> bool {
        self.active.remove(&voice)
    }

    /// Stop everything queued or playing and reset the cursor
    pub fn cancel_all(&mut self) {
        for voice in self.active.drain() {
            self.output.stop_voice(voice);
        }
        if let Some(resampler) = &mut self.resampler {
            resampler.reset();
        }
        self.next_start_time = 0.0;
    }

    /// Voices not yet finished
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Start time the next chunk would get if the clock were at zero
    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Cancel playback and release the output
    pub fn close(&mut self) {
        self.cancel_all();
        self.output.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{Mixer, MixerHandle};

    fn pcm(frames: usize) -> Vec<u8> {
        vec![0; frames * 2]
    }

    #[test]
    fn chunks_queue_back_to_back() {
        let mixer = MixerHandle::new(Mixer::new(OUTPUT_SAMPLE_RATE, None));
        let mut scheduler = PlaybackScheduler::new(Box::new(mixer));

        let a = scheduler.schedule(&pcm(2400));
        let b = scheduler.schedule(&pcm(4800));
        assert!(a.start_at.abs() < 1e-9);
        assert!((b.start_at - 0.1).abs() < 1e-9);
        assert!((scheduler.next_start_time() - 0.3).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 2);
    }

    #[test]
    fn late_chunk_starts_at_clock() {
        let mixer = MixerHandle::new(Mixer::new(OUTPUT_SAMPLE_RATE, None));
        let mut scheduler = PlaybackScheduler::new(Box::new(mixer.clone()));

        scheduler.schedule(&pcm(2400));
        mixer.advance(24000);
        let late = scheduler.schedule(&pcm(2400));
        assert!((late.start_at - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_all_resets_cursor_and_tolerates_finished_voices() {
        let mixer = MixerHandle::new(Mixer::new(OUTPUT_SAMPLE_RATE, None));
        let mut scheduler = PlaybackScheduler::new(Box::new(mixer.clone()));

        scheduler.schedule(&pcm(240));
        scheduler.schedule(&pcm(24000));
        // First voice has played out but its end was never reported
        mixer.advance(480);

        scheduler.cancel_all();
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.next_start_time().abs() < f64::EPSILON);
        assert_eq!(mixer.lock().voice_count(), 0);
    }

    #[test]
    fn ended_voices_leave_active_set() {
        let mixer = MixerHandle::new(Mixer::new(OUTPUT_SAMPLE_RATE, None));
        let mut scheduler = PlaybackScheduler::new(Box::new(mixer));

        let chunk = scheduler.schedule(&pcm(10));
        assert!(scheduler.on_voice_ended(chunk.voice));
        assert!(!scheduler.on_voice_ended(chunk.voice));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn flush_is_noop_at_native_rate() {
        let mixer = MixerHandle::new(Mixer::new(OUTPUT_SAMPLE_RATE, None));
        let mut scheduler = PlaybackScheduler::new(Box::new(mixer));
        scheduler.schedule(&pcm(240));
        assert!(scheduler.flush().is_none());
    }

    #[test]
    fn foreign_rate_output_streams_without_overlap() {
        let mixer = MixerHandle::new(Mixer::new(48000, None));
        let mut scheduler = PlaybackScheduler::new(Box::new(mixer.clone()));

        let mut placed: Vec<ScheduledChunk> = (0..3).map(|_| scheduler.schedule(&pcm(2400))).collect();
        placed.extend(scheduler.flush());
        assert_eq!(placed.len(), 4);

        for pair in placed.windows(2) {
            assert!(pair[1].start_at >= pair[0].start_at + pair[0].duration - 1e-9);
        }
        // Nothing of the 0.3 s turn is held back
        let total: f64 = placed.iter().map(|c| c.duration).sum();
        assert!(total >= 0.3);
        assert!(scheduler.flush().is_none());
    }
}
