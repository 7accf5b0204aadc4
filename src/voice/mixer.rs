//! Sample-accurate voice mixer
//!
//! The mixer is the output clock: time advances only as frames are rendered.
//! Voices start on an exact frame and report back once they have played out.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::codec::PlaybackBuffer;
use super::resample::resample_buffer;

/// Identifier of a scheduled voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// A destination voices can be scheduled on
///
/// Times are seconds on the output's own clock.
pub trait AudioOutput: Send + Sync {
    /// Rate the output renders at
    fn sample_rate(&self) -> u32;

    /// Current position of the output clock
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `at` (or immediately if `at` is in the past)
    fn start_voice(&self, buffer: &PlaybackBuffer, at: f64) -> VoiceId;

    /// Stop a voice; unknown or finished voices are ignored
    fn stop_voice(&self, id: VoiceId);

    /// Release the underlying device; safe to call more than once
    fn close(&self);
}

struct Voice {
    id: VoiceId,
    start_frame: u64,
    samples: Vec<f32>,
    cursor: usize,
}

/// Mixes scheduled mono voices into an output buffer
pub struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    next_id: u64,
    voices: Vec<Voice>,
    ended: Option<mpsc::UnboundedSender<VoiceId>>,
}

impl Mixer {
    /// Create a mixer running at `sample_rate`
    ///
    /// Naturally finished voices are reported on `ended` when given.
    #[must_use]
    pub const fn new(sample_rate: u32, ended: Option<mpsc::UnboundedSender<VoiceId>>) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            next_id: 1,
            voices: Vec::new(),
            ended,
        }
    }

    /// Rate the mixer renders at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds rendered so far
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / f64::from(self.sample_rate)
    }

    /// Number of voices still scheduled or playing
    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Schedule a buffer, resampling and downmixing as needed
    pub fn start_voice(&mut self, buffer: &PlaybackBuffer, at: f64) -> VoiceId {
        let samples = voice_samples(buffer, self.sample_rate);
        self.start_samples(samples, at)
    }

    /// Schedule mono samples already at the mixer rate
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn start_samples(&mut self, samples: Vec<f32>, at: f64) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;

        let requested = (at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let start_frame = requested.max(self.frames_rendered);

        // Empty voices still finish (and report) on the next render
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
            cursor: 0,
        });
        id
    }

    /// Drop a voice without reporting it as ended
    pub fn stop_voice(&mut self, id: VoiceId) {
        self.voices.retain(|v| v.id != id);
    }

    /// Drop every voice
    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    /// Render interleaved frames into `out`
    #[allow(clippy::cast_possible_truncation)]
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let now = self.frames_rendered + i as u64;
            let mut sum = 0.0f32;
            for voice in &mut self.voices {
                if voice.start_frame <= now && voice.cursor < voice.samples.len() {
                    sum += voice.samples[voice.cursor];
                    voice.cursor += 1;
                }
            }
            let sample = sum.clamp(-1.0, 1.0);
            frame.fill(sample);
        }

        self.frames_rendered += frames as u64;

        let end = self.frames_rendered;
        let mut finished = Vec::new();
        self.voices.retain(|v| {
            let done = v.cursor >= v.samples.len() && v.start_frame <= end;
            if done {
                finished.push(v.id);
            }
            !done
        });

        if let Some(ended) = &self.ended {
            for id in finished {
                let _ = ended.send(id);
            }
        }
    }
}

/// Mono samples of `buffer` at `rate`
fn voice_samples(buffer: &PlaybackBuffer, rate: u32) -> Vec<f32> {
    if buffer.sample_rate == rate {
        return buffer.to_mono();
    }
    match resample_buffer(buffer, rate) {
        Ok(converted) => converted.to_mono(),
        Err(e) => {
            tracing::warn!(error = %e, "voice resample failed, playing silence");
            Vec::new()
        }
    }
}

/// Shared handle to a mixer
///
/// This is what a device callback renders from, and it doubles as an
/// [`AudioOutput`] with a manually driven clock.
#[derive(Clone)]
pub struct MixerHandle(Arc<Mutex<Mixer>>);

impl MixerHandle {
    /// Wrap a mixer
    #[must_use]
    pub fn new(mixer: Mixer) -> Self {
        Self(Arc::new(Mutex::new(mixer)))
    }

    /// Lock the mixer, recovering from a poisoned lock
    pub fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Render frames, advancing the clock
    pub fn render(&self, out: &mut [f32], channels: usize) {
        self.lock().render(out, channels);
    }

    /// Render `frames` mono frames and discard the output
    pub fn advance(&self, frames: usize) {
        let mut scratch = vec![0.0; frames];
        self.render(&mut scratch, 1);
    }
}

impl AudioOutput for MixerHandle {
    fn sample_rate(&self) -> u32 {
        self.lock().sample_rate()
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    fn start_voice(&self, buffer: &PlaybackBuffer, at: f64) -> VoiceId {
        // The render callback shares this lock; convert before taking it
        let samples = voice_samples(buffer, self.sample_rate());
        self.lock().start_samples(samples, at)
    }

    fn stop_voice(&self, id: VoiceId) {
        self.lock().stop_voice(id);
    }

    fn close(&self) {
        self.lock().stop_all();
    }
}
