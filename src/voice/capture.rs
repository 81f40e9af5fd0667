//! Audio capture from the microphone
//!
//! The device callback downmixes to mono, resamples to the target rate and
//! slices the stream into fixed-duration [`AudioChunk`]s, each pushed to the
//! registered callback as it completes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::device::{DeviceDirection, select_device};
use super::resample::StreamResampler;
use super::wav::samples_to_wav;
use crate::session::AudioSource;
use crate::{Error, Result};

/// Fixed-duration mono buffer tagged with its capture order
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub seq: u64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Playing time of the chunk
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Encode as a WAV container
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }
}

/// Delivered from the capture callback
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Chunk(AudioChunk),
    /// Stream error; terminal for the session
    Fault(String),
}

/// Slices a continuous sample stream into fixed-length chunks
#[derive(Debug)]
pub struct Chunker {
    chunk_len: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    next_seq: u64,
}

impl Chunker {
    /// Create a chunker emitting `chunk` worth of samples at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32, chunk: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let chunk_len = ((f64::from(sample_rate) * chunk.as_secs_f64()).round() as usize).max(1);
        Self {
            chunk_len,
            sample_rate,
            buffer: Vec::with_capacity(chunk_len),
            next_seq: 0,
        }
    }

    /// Samples per chunk
    #[must_use]
    pub const fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Append samples, returning every chunk completed by them
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioChunk> {
        let mut chunks = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let take = (self.chunk_len - self.buffer.len()).min(rest.len());
            self.buffer.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.buffer.len() == self.chunk_len {
                let samples =
                    std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_len));
                chunks.push(AudioChunk {
                    seq: self.next_seq,
                    samples,
                    sample_rate: self.sample_rate,
                });
                self.next_seq += 1;
            }
        }

        chunks
    }
}

/// State shared by the data and error callbacks
struct Pipeline<F> {
    channels: usize,
    resampler: StreamResampler,
    chunker: Chunker,
    on_event: F,
    faulted: bool,
}

impl<F: FnMut(CaptureEvent)> Pipeline<F> {
    fn feed<T>(&mut self, data: &[T])
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        if self.faulted {
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        let mono: Vec<f32> = data
            .chunks(self.channels)
            .map(|frame| {
                frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
            })
            .collect();

        match self.resampler.push(&mono) {
            Ok(samples) => {
                for chunk in self.chunker.push(&samples) {
                    (self.on_event)(CaptureEvent::Chunk(chunk));
                }
            }
            Err(e) => self.fault(e.to_string()),
        }
    }

    fn fault(&mut self, message: String) {
        if self.faulted {
            return;
        }
        self.faulted = true;
        (self.on_event)(CaptureEvent::Fault(message));
    }
}

/// Captures mono audio from the preferred input device
pub struct AudioCapture {
    device: Device,
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    target_rate: u32,
    chunk: Duration,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the first input device matching `preferred`, else the default
    ///
    /// Uses a mono config at `sample_rate` when the device offers one,
    /// otherwise the device default with downmix and resampling.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device is available, or `Audio` if the
    /// device has no usable configuration
    pub fn new(preferred: &[String], sample_rate: u32, chunk: Duration) -> Result<Self> {
        let (device, device_name) = select_device(DeviceDirection::Input, preferred)?;

        let native = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .map(|c| c.with_sample_rate(SampleRate(sample_rate)));

        let supported = match native {
            Some(config) => config,
            None => device
                .default_input_config()
                .map_err(|e| Error::Audio(format!("no usable input config: {e}")))?,
        };

        let sample_format = supported.sample_format();
        let config = supported.config();

        tracing::debug!(
            device = %device_name,
            device_rate = config.sample_rate.0,
            target_rate = sample_rate,
            channels = config.channels,
            format = ?sample_format,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            device_name,
            config,
            sample_format,
            target_rate: sample_rate,
            chunk,
            stream: None,
        })
    }

    /// Name of the opened device
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Rate of the delivered chunks
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    /// Whether the stream is running
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Start the stream, pushing each completed chunk to `on_event`
    ///
    /// `on_event` runs on the audio thread and must not block for long.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started
    pub fn start_with<F>(&mut self, on_event: F) -> Result<()>
    where
        F: FnMut(CaptureEvent) + Send + 'static,
    {
        if self.stream.is_some() {
            return Ok(());
        }

        let pipeline = Arc::new(Mutex::new(Pipeline {
            channels: usize::from(self.config.channels.max(1)),
            resampler: StreamResampler::new(self.config.sample_rate.0, self.target_rate)?,
            chunker: Chunker::new(self.target_rate, self.chunk),
            on_event,
            faulted: false,
        }));

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, F>(pipeline)?,
            SampleFormat::I16 => self.build_stream::<i16, F>(pipeline)?,
            SampleFormat::U16 => self.build_stream::<u16, F>(pipeline)?,
            SampleFormat::I32 => self.build_stream::<i32, F>(pipeline)?,
            other => {
                return Err(Error::Audio(format!("unsupported sample format {other:?}")));
            }
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::info!(device = %self.device_name, "audio capture started");
        Ok(())
    }

    fn build_stream<T, F>(&self, pipeline: Arc<Mutex<Pipeline<F>>>) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
        F: FnMut(CaptureEvent) + Send + 'static,
    {
        let on_error = Arc::clone(&pipeline);

        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    pipeline
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .feed(data);
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    on_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .fault(err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))
    }

    /// Stop capturing and release the stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!(device = %self.device_name, "audio capture stopped");
        }
    }
}

impl AudioSource for AudioCapture {
    fn start(&mut self, tx: mpsc::Sender<CaptureEvent>) -> Result<()> {
        self.start_with(move |event| match event {
            CaptureEvent::Chunk(chunk) => match tx.try_send(CaptureEvent::Chunk(chunk)) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(CaptureEvent::Chunk(dropped))) => {
                    tracing::warn!(seq = dropped.seq, "capture queue full, dropping chunk");
                }
                Err(TrySendError::Full(_)) => {}
            },
            fault @ CaptureEvent::Fault(_) => match tx.try_send(fault) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                // Faults must reach the loop but the audio thread must not
                // block; the handoff fails once the loop closes its receiver
                Err(TrySendError::Full(fault)) => {
                    let tx = tx.clone();
                    std::thread::spawn(move || {
                        let _ = tx.blocking_send(fault);
                    });
                }
            },
        })
    }

    fn stop(&mut self) {
        Self::stop(self);
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        Self::stop(self);
    }
}
