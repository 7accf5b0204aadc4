//! Speaker output backed by a cpal stream

use std::sync::Mutex;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::codec::PlaybackBuffer;
use super::mixer::{AudioOutput, Mixer, MixerHandle, VoiceId};
use super::stream::StreamThread;
use crate::{Error, Result};

/// An output "audio context": a mixer rendered by the default output device
pub struct OutputContext {
    mixer: MixerHandle,
    stream: Mutex<Option<StreamThread>>,
}

impl OutputContext {
    /// Open the default output device at `sample_rate`
    ///
    /// Mono is preferred, stereo accepted. When the device cannot run at the
    /// requested rate its default rate is used and voices are resampled.
    ///
    /// # Errors
    ///
    /// Returns error if no output device can be opened
    pub fn open(sample_rate: u32, ended: mpsc::UnboundedSender<VoiceId>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let config = output_config(&device, sample_rate)?;
        let channels = config.channels as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels,
            "audio output initialized"
        );

        let mixer = MixerHandle::new(Mixer::new(config.sample_rate.0, Some(ended)));
        let render = mixer.clone();

        let stream = StreamThread::spawn("kindly-output", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("no output device".to_string()))?;
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render.render(data, channels);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio output error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))
        })?;

        Ok(Self {
            mixer,
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Mixer driven by this context
    #[must_use]
    pub const fn mixer(&self) -> &MixerHandle {
        &self.mixer
    }
}

fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.min_sample_rate() <= SampleRate(sample_rate)
            && c.max_sample_rate() >= SampleRate(sample_rate)
    };

    let exact = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            // Fallback: try stereo
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        });

    if let Some(range) = exact {
        return Ok(range.with_sample_rate(SampleRate(sample_rate)).config());
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
    tracing::debug!(
        requested = sample_rate,
        device_rate = default.sample_rate().0,
        "output device rate differs, resampling voices"
    );
    Ok(default.config())
}

impl AudioOutput for OutputContext {
    fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    fn current_time(&self) -> f64 {
        self.mixer.current_time()
    }

    fn start_voice(&self, buffer: &PlaybackBuffer, at: f64) -> VoiceId {
        self.mixer.start_voice(buffer, at)
    }

    fn stop_voice(&self, id: VoiceId) {
        self.mixer.stop_voice(id);
    }

    fn close(&self) {
        self.mixer.close();
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut stream) = stream {
            stream.stop();
        }
    }
}
