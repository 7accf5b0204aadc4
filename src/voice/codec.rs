//! PCM codec helpers
//!
//! Conversions between raw 16-bit PCM, the base64 text encoding used on the
//! live session wire, and floating-point buffers ready for playback.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Microphone capture rate expected by the live session
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Rate of the PCM the live session streams back
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Channels of the PCM the live session streams back
pub const OUTPUT_CHANNELS: usize = 1;

/// Samples per capture block
pub const BLOCK_SIZE: usize = 4096;

/// Mime type attached to every outbound audio packet
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Encode raw bytes as base64 text
#[must_use]
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text back into raw bytes
///
/// # Errors
///
/// Returns `Error::Decode` if the input is not valid base64
pub fn decode_bytes(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// Convert floating-point samples to 16-bit little-endian PCM
///
/// Samples are scaled by 32768 and wrapped into 16 bits without clamping, so
/// a full-scale `1.0` comes out as `-32768`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn floats_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32768.0) as i32 as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decoded, de-interleaved audio ready to be handed to an output
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    /// Frames per second
    pub sample_rate: u32,
    /// One sample vector per channel, all the same length
    pub channels: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    /// Build a mono buffer from samples
    #[must_use]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Number of frames in the buffer
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Average all channels into one
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Reinterpret PCM bytes as signed 16-bit little-endian interleaved samples
///
/// Trailing bytes that do not form a whole frame are dropped.
#[must_use]
pub fn build_playback_buffer(bytes: &[u8], sample_rate: u32, channels: usize) -> PlaybackBuffer {
    let channels = channels.max(1);
    let frame_bytes = 2 * channels;
    let frame_count = bytes.len() / frame_bytes;

    let mut data = vec![Vec::with_capacity(frame_count); channels];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            data[channel].push(f32::from(value) / 32768.0);
        }
    }

    PlaybackBuffer {
        sample_rate,
        channels: data,
    }
}

/// Microphone audio packaged for the live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAudioPacket {
    /// Base64 encoded 16-bit PCM
    pub data: String,
    /// Describes the PCM format, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl EncodedAudioPacket {
    /// Encode captured samples as a 16 kHz PCM packet
    #[must_use]
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            data: encode_bytes(&floats_to_pcm16(samples)),
            mime_type: INPUT_MIME_TYPE.to_string(),
        }
    }

    /// One block of silence
    ///
    /// The live model waits for user audio before taking its first turn, so a
    /// silent block is sent right after the session opens.
    #[must_use]
    pub fn silence() -> Self {
        Self::from_samples(&[0.0; BLOCK_SIZE])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_invalid_text() {
        assert!(matches!(decode_bytes("not base64!"), Err(crate::Error::Decode(_))));
    }

    #[test]
    fn encode_decode_preserves_pcm() {
        let pcm: Vec<u8> = (0..=255).chain((0..=255).rev()).collect();
        let text = encode_bytes(&pcm);
        assert_eq!(decode_bytes(&text).unwrap(), pcm);
    }

    #[test]
    fn pcm_conversion_wraps_instead_of_clamping() {
        let bytes = floats_to_pcm16(&[0.0, 0.5, -1.0, 1.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![0, 16384, -32768, -32768]);
    }

    #[test]
    fn playback_buffer_deinterleaves_channels() {
        let mut bytes = Vec::new();
        for v in [16384_i16, -16384, 8192, -8192] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let buffer = build_playback_buffer(&bytes, OUTPUT_SAMPLE_RATE, 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channels[0], vec![0.5, 0.25]);
        assert_eq!(buffer.channels[1], vec![-0.5, -0.25]);
        assert_eq!(buffer.to_mono(), vec![0.0, 0.0]);
    }

    #[test]
    fn playback_buffer_drops_partial_frame() {
        let buffer = build_playback_buffer(&[0, 64, 7], OUTPUT_SAMPLE_RATE, 1);
        assert_eq!(buffer.frames(), 1);
        assert!((buffer.channels[0][0] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let buffer = PlaybackBuffer::mono(OUTPUT_SAMPLE_RATE, vec![0.0; 12000]);
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn silence_packet_is_one_block() {
        let packet = EncodedAudioPacket::silence();
        assert_eq!(packet.mime_type, INPUT_MIME_TYPE);
        let bytes = decode_bytes(&packet.data).unwrap();
        assert_eq!(bytes.len(), BLOCK_SIZE * 2);
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
