//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};

use super::device::{DeviceDirection, select_device};
use super::resample::resample_linear;
use super::wav::wav_to_samples;
use crate::{Error, Result};

/// Extra time allowed past the expected playback duration
const PLAYBACK_SLACK: Duration = Duration::from_millis(500);

/// Plays mono audio on the preferred output device at its native rate
pub struct AudioPlayback {
    device: Device,
    device_name: String,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the first output device matching `preferred`, else the default
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available or it has no f32 config
    pub fn new(preferred: &[String]) -> Result<Self> {
        let (device, device_name) = select_device(DeviceDirection::Output, preferred)?;

        let supported = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("no usable output config: {e}")))?;

        if supported.sample_format() != SampleFormat::F32 {
            return Err(Error::Audio(format!(
                "unsupported output sample format {:?}",
                supported.sample_format()
            )));
        }

        let config = supported.config();

        tracing::debug!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            device_name,
            config,
        })
    }

    /// Native rate of the output device
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Name of the opened device
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Decode encoded audio (MP3 or WAV) and play it
    ///
    /// Blocks until playback finishes.
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_encoded(&self, audio: &[u8]) -> Result<()> {
        let (samples, rate) = decode_audio(audio)?;
        self.play(&samples, rate)
    }

    /// Play mono samples recorded at `sample_rate`
    ///
    /// Resamples to the device rate when they differ and clamps to [-1, 1].
    /// Blocks until playback finishes.
    ///
    /// # Errors
    ///
    /// Returns error if resampling or playback fails
    pub fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device_rate = self.sample_rate();
        let samples: Arc<Vec<f32>> = Arc::new(
            resample_linear(samples, sample_rate, device_rate)?
                .into_iter()
                .map(|s| s.clamp(-1.0, 1.0))
                .collect(),
        );

        let channels = usize::from(self.config.channels.max(1));
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let source = Arc::clone(&samples);
        let cursor = Arc::clone(&position);
        let done = Arc::clone(&finished);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = cursor.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = source.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < source.len() {
                            pos += 1;
                        }
                    }
                    cursor.store(pos, Ordering::Relaxed);
                    if pos >= source.len() {
                        done.store(true, Ordering::Release);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        #[allow(clippy::cast_precision_loss)]
        let expected = Duration::from_secs_f64(samples.len() as f64 / f64::from(device_rate));
        let start = Instant::now();

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > expected + PLAYBACK_SLACK {
                tracing::warn!("playback did not finish in time");
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(
            samples = samples.len(),
            device = %self.device_name,
            "playback complete"
        );

        Ok(())
    }
}

/// Decode MP3 or WAV bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the bytes are not decodable
pub fn decode_audio(audio: &[u8]) -> Result<(Vec<f32>, u32)> {
    if audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE" {
        return wav_to_samples(audio);
    }
    decode_mp3(audio)
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }
                let channels = frame.channels.max(1);

                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    chunk.iter().map(|&s| f32::from(s) / 32768.0).sum::<f32>() / chunk.len() as f32
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok((samples, sample_rate))
}
