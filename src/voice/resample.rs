//! Sample rate conversion using rubato

use rubato::{FftFixedIn, Resampler};

use super::codec::PlaybackBuffer;
use crate::{Error, Result};

/// Input frames handed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks used by the FFT resampler
const SUB_CHUNKS: usize = 2;

fn new_resampler(from_rate: u32, to_rate: u32) -> Result<FftFixedIn<f32>> {
    FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))
}

/// Resample a complete mono signal
///
/// The last partial chunk is zero-padded and the output trimmed to the
/// expected length.
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample_all(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = new_resampler(from_rate, to_rate)?;
    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    for chunk in samples.chunks(CHUNK_SIZE) {
        let mut input = chunk.to_vec();
        input.resize(CHUNK_SIZE, 0.0);
        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // FFT resampling delays the signal; drop the leading delay so timing holds
    let delay = resampler.output_delay();
    if delay < output.len() {
        output.drain(..delay);
    }
    output.truncate(expected);
    Ok(output)
}

/// Downmix a buffer and convert it to `to_rate`
///
/// # Errors
///
/// Returns error if resampling fails
pub fn resample_buffer(buffer: &PlaybackBuffer, to_rate: u32) -> Result<PlaybackBuffer> {
    let mono = buffer.to_mono();
    let samples = if buffer.sample_rate == to_rate {
        mono
    } else {
        resample_all(&mono, buffer.sample_rate, to_rate)?
    };
    Ok(PlaybackBuffer::mono(to_rate, samples))
}

/// Streaming resampler for audio arriving in arbitrary slices
pub struct ChunkResampler {
    inner: FftFixedIn<f32>,
    pending: Vec<f32>,
    primed: bool,
}

impl ChunkResampler {
    /// Create a resampler between two rates
    ///
    /// # Errors
    ///
    /// Returns error if the rates are unsupported
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        Ok(Self {
            inner: new_resampler(from_rate, to_rate)?,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
            primed: false,
        })
    }

    /// Feed samples and append whatever output is ready to `out`
    pub fn push(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        self.primed |= !samples.is_empty();
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.inner.input_frames_next() {
            let needed = self.inner.input_frames_next();
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match self.inner.process(&[chunk], None) {
                Ok(result) => out.extend_from_slice(&result[0]),
                Err(e) => {
                    tracing::warn!(error = %e, "streaming resample failed");
                    return;
                }
            }
        }
    }

    /// Drain buffered input and the filter delay into `out`, then start over
    ///
    /// Pads with silence, so a flushed stream ends with a short quiet tail.
    pub fn flush(&mut self, out: &mut Vec<f32>) {
        if !self.primed {
            return;
        }
        let needed = self.inner.input_frames_next();
        let padded = self.pending.len().div_ceil(needed).max(1) * needed;
        self.pending.resize(padded + needed, 0.0);
        self.push(&[], out);
        self.reset();
    }

    /// Drop buffered input and filter state
    pub fn reset(&mut self) {
        self.inner.reset();
        self.pending.clear();
        self.primed = false;
    }
}
