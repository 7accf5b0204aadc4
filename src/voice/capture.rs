//! Audio capture from microphone
//!
//! Raw device callbacks are framed into fixed 4096-sample blocks at 16 kHz and
//! forwarded over a channel; PCM encoding happens on the receiving side.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BuildStreamError, SampleRate, StreamConfig, SupportedStreamConfigsError};
use tokio::sync::mpsc;

use super::codec::{BLOCK_SIZE, INPUT_SAMPLE_RATE};
use super::resample::ChunkResampler;
use super::stream::StreamThread;
use crate::{Error, Result};

/// One fixed-size block of captured samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock(pub Vec<f32>);

impl AudioBlock {
    /// Samples in the block
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.0
    }
}

/// Cuts a continuous sample stream into fixed-size blocks
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    /// Create a framer emitting blocks of `block_size` samples
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            pending: Vec::with_capacity(block_size),
        }
    }

    /// Append samples and return every completed block, in order
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioBlock> {
        let mut blocks = Vec::new();
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.block_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.block_size {
                let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                blocks.push(AudioBlock(block));
            }
        }
        blocks
    }

    /// Samples waiting for the next block
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Processing tap attached to the input stream
///
/// Runs on the audio thread: picks channel 0, resamples to 16 kHz when the
/// device runs at another rate, frames and forwards blocks.
pub struct CaptureTap {
    framer: BlockFramer,
    resampler: Option<ChunkResampler>,
    scratch: Vec<f32>,
    blocks: mpsc::UnboundedSender<AudioBlock>,
}

impl CaptureTap {
    /// Create a tap sending 4096-sample blocks to `blocks`
    #[must_use]
    pub fn new(blocks: mpsc::UnboundedSender<AudioBlock>) -> Self {
        Self {
            framer: BlockFramer::new(BLOCK_SIZE),
            resampler: None,
            scratch: Vec::new(),
            blocks,
        }
    }

    /// Resample from `device_rate` before framing
    ///
    /// # Errors
    ///
    /// Returns error if the rate pair is unsupported
    pub fn with_device_rate(mut self, device_rate: u32) -> Result<Self> {
        if device_rate != INPUT_SAMPLE_RATE {
            self.resampler = Some(ChunkResampler::new(device_rate, INPUT_SAMPLE_RATE)?);
        }
        Ok(self)
    }

    /// Feed interleaved device samples
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        let channels = channels.max(1);
        self.scratch.clear();
        if channels == 1 {
            self.scratch.extend_from_slice(data);
        } else {
            self.scratch.extend(data.iter().step_by(channels));
        }

        let samples = if let Some(resampler) = &mut self.resampler {
            let mut out = Vec::with_capacity(self.scratch.len());
            resampler.push(&self.scratch, &mut out);
            out
        } else {
            std::mem::take(&mut self.scratch)
        };

        for block in self.framer.push(&samples) {
            // Receiver gone means capture is being torn down
            if self.blocks.send(block).is_err() {
                break;
            }
        }
    }
}

/// Source of microphone audio
pub trait Microphone: Send {
    /// Attach a processing tap and start delivering audio to it
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    fn attach(&mut self, tap: CaptureTap) -> Result<()>;

    /// Disconnect the tap; no-op when detached
    fn detach(&mut self);

    /// Release the device; no-op when already released
    fn release(&mut self);
}

/// Microphone on the default cpal input device
pub struct CpalMicrophone {
    config: StreamConfig,
    stream: Option<StreamThread>,
    released: bool,
}

impl CpalMicrophone {
    /// Acquire the default input device
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no input device exists and
    /// `PermissionDenied` if the host refuses access
    pub fn acquire() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let config = input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            stream: None,
            released: false,
        })
    }

    /// Rate the device delivers samples at
    #[must_use]
    pub const fn device_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

fn input_config(device: &cpal::Device) -> Result<StreamConfig> {
    let exact = device
        .supported_input_configs()
        .map_err(map_configs_error)?
        .find(|c| {
            c.min_sample_rate() <= SampleRate(INPUT_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(INPUT_SAMPLE_RATE)
        });

    if let Some(range) = exact {
        return Ok(range.with_sample_rate(SampleRate(INPUT_SAMPLE_RATE)).config());
    }

    let default = device
        .default_input_config()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
    Ok(default.config())
}

fn map_configs_error(e: SupportedStreamConfigsError) -> Error {
    match e {
        SupportedStreamConfigsError::DeviceNotAvailable => {
            Error::DeviceUnavailable("input device disappeared".to_string())
        }
        other => classify(other.to_string()),
    }
}

fn map_build_error(e: BuildStreamError) -> Error {
    match e {
        BuildStreamError::DeviceNotAvailable => {
            Error::DeviceUnavailable("input device disappeared".to_string())
        }
        other => classify(other.to_string()),
    }
}

/// Hosts report refusals as backend-specific text
fn classify(message: String) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        Error::PermissionDenied(message)
    } else {
        Error::Audio(message)
    }
}

impl Microphone for CpalMicrophone {
    fn attach(&mut self, tap: CaptureTap) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.released {
            return Err(Error::DeviceUnavailable("microphone already released".to_string()));
        }

        let config = self.config.clone();
        let channels = config.channels as usize;
        let mut tap = tap.with_device_rate(config.sample_rate.0)?;

        let stream = StreamThread::spawn("kindly-capture", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("no input device".to_string()))?;
            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        tap.push_interleaved(data, channels);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio capture error");
                    },
                    None,
                )
                .map_err(map_build_error)
        })?;

        self.stream = Some(stream);
        tracing::debug!("audio capture started");
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!("audio capture stopped");
        }
    }

    fn release(&mut self) {
        self.detach();
        self.released = true;
    }
}

/// Capture pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No tap attached
    Idle,
    /// Blocks are flowing
    Capturing,
}

/// Drives a microphone through Idle -> Capturing -> Idle
pub struct CapturePipeline {
    microphone: Box<dyn Microphone>,
    state: CaptureState,
}

impl CapturePipeline {
    /// Wrap an acquired microphone
    #[must_use]
    pub fn new(microphone: Box<dyn Microphone>) -> Self {
        Self {
            microphone,
            state: CaptureState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Start delivering blocks to `blocks`
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot start streaming
    pub fn begin(&mut self, blocks: mpsc::UnboundedSender<AudioBlock>) -> Result<()> {
        if self.state == CaptureState::Capturing {
            return Ok(());
        }
        self.microphone.attach(CaptureTap::new(blocks))?;
        self.state = CaptureState::Capturing;
        Ok(())
    }

    /// Disconnect the tap and release the microphone; idempotent
    pub fn stop(&mut self) {
        self.microphone.detach();
        self.microphone.release();
        self.state = CaptureState::Idle;
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer_emits_whole_blocks_and_keeps_remainder() {
        let mut framer = BlockFramer::new(4);
        assert!(framer.push(&[0.1, 0.2, 0.3]).is_empty());
        let blocks = framer.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].samples(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(blocks[1].samples(), &[0.5, 0.6, 0.7, 0.8]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn tap_uses_first_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tap = CaptureTap::new(tx);
        let interleaved: Vec<f32> = (0..BLOCK_SIZE).flat_map(|_| [0.25, -0.75]).collect();
        tap.push_interleaved(&interleaved, 2);

        let block = rx.try_recv().unwrap();
        assert_eq!(block.samples().len(), BLOCK_SIZE);
        assert!(block.samples().iter().all(|&s| (s - 0.25).abs() < f32::EPSILON));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tap_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut tap = CaptureTap::new(tx);
        tap.push_interleaved(&[0.0; BLOCK_SIZE * 2], 1);
    }

    #[test]
    fn permission_text_is_classified() {
        assert!(matches!(
            classify("Access denied by user".to_string()),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(classify("buffer underrun".to_string()), Error::Audio(_)));
    }

    #[test]
    fn wav_has_riff_header() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5], 16000).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }
}
