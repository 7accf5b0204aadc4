//! Audio devices used by a call

use tokio::sync::mpsc;

use crate::Result;
use crate::voice::{AudioOutput, CpalMicrophone, Microphone, OutputContext, VoiceId};

/// Source of per-call audio resources
pub trait AudioBackend: Send + Sync {
    /// Acquire the microphone
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `DeviceUnavailable` when no microphone
    /// can be used
    fn acquire_microphone(&self) -> Result<Box<dyn Microphone>>;

    /// Open an output context running at `sample_rate`
    ///
    /// Voices that finish on their own are reported on `ended`.
    ///
    /// # Errors
    ///
    /// Returns error if no output device can be opened
    fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<VoiceId>,
    ) -> Result<Box<dyn AudioOutput>>;
}

/// Default host devices through cpal
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn acquire_microphone(&self) -> Result<Box<dyn Microphone>> {
        Ok(Box::new(CpalMicrophone::acquire()?))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<VoiceId>,
    ) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(OutputContext::open(sample_rate, ended)?))
    }
}
