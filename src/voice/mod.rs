//! Voice processing module
//!
//! Handles microphone capture, PCM conversion, gapless speech playback and
//! music preview playback.

mod capture;
pub mod codec;
mod decode;
mod mixer;
mod music;
mod output;
mod playback;
mod resample;
mod stream;

pub use capture::{
    AudioBlock, BlockFramer, CapturePipeline, CaptureState, CaptureTap, CpalMicrophone,
    Microphone, samples_to_wav,
};
pub use codec::{
    BLOCK_SIZE, EncodedAudioPacket, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, PlaybackBuffer,
    build_playback_buffer, decode_bytes, encode_bytes, floats_to_pcm16,
};
pub use decode::decode_preview;
pub use mixer::{AudioOutput, Mixer, MixerHandle, VoiceId};
pub use music::{MusicPlayer, PreviewPlayer};
pub use output::OutputContext;
pub use playback::{PlaybackScheduler, ScheduledChunk};
pub use resample::{ChunkResampler, resample_all, resample_buffer};
pub use stream::StreamThread;
