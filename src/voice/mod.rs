//! Voice I/O: device selection, capture, playback, and speech synthesis
//!
//! Capture delivers fixed-duration mono chunks at the configured rate,
//! resampling from the device's native rate when the two differ.

mod capture;
mod device;
mod playback;
mod resample;
mod speaker;
mod tts;
mod wav;

pub use capture::{AudioCapture, AudioChunk, CaptureEvent, Chunker};
pub use device::{DeviceDirection, DeviceInfo, DeviceSelection, choose_device, list_devices, select_device};
pub use playback::{AudioPlayback, decode_audio};
pub use resample::{StreamResampler, resample_linear};
pub use speaker::{PhraseCache, Speaker};
pub use tts::{TextToSpeech, TtsProvider};
pub use wav::{samples_to_wav, wav_to_samples};

/// Canonical capture rate for speech (16kHz)
pub const SAMPLE_RATE: u32 = 16000;
