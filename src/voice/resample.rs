//! Linear sample-rate conversion for mono audio

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::{Error, Result};

/// Frames fed to the resampler per call
const CHUNK_FRAMES: usize = 1024;

fn new_resampler(from: u32, to: u32) -> Result<FastFixedIn<f32>> {
    if from == 0 || to == 0 {
        return Err(Error::Audio("sample rates must be greater than 0".to_string()));
    }

    let ratio = f64::from(to) / f64::from(from);
    FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Linear, CHUNK_FRAMES, 1)
        .map_err(|e| Error::Audio(format!("failed to create resampler: {e}")))
}

/// Resample a complete mono buffer from `from` Hz to `to` Hz
///
/// Output length is `round(len * to / from)`.
///
/// # Errors
///
/// Returns error if either rate is zero or resampling fails
pub fn resample_linear(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = new_resampler(from, to)?;
    let ratio = f64::from(to) / f64::from(from);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let expected = (input.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay);
    let mut pos = 0;

    while input.len() - pos >= resampler.input_frames_next() {
        let frames = resampler.input_frames_next();
        let wave: [&[f32]; 1] = [&input[pos..pos + frames]];
        let out = resampler
            .process(&wave[..], None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&out[0]);
        pos += frames;
    }

    if pos < input.len() {
        let wave: [&[f32]; 1] = [&input[pos..]];
        let out = resampler
            .process_partial(Some(&wave[..]), None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&out[0]);
    }

    // Flush the interpolator's delay line
    let mut flushes = 0;
    while output.len() < expected + delay && flushes < 4 {
        let out = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&out[0]);
        flushes += 1;
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Incremental resampler for live capture
///
/// Buffers input until a full resampler block is available, so callers may
/// push arbitrarily sized device buffers.
pub struct StreamResampler {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler from `from` Hz to `to` Hz (pass-through if equal)
    ///
    /// # Errors
    ///
    /// Returns error if either rate is zero
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let resampler = if from == to {
            None
        } else {
            Some(new_resampler(from, to)?)
        };

        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    /// Push mono samples, returning whatever output is ready
    ///
    /// # Errors
    ///
    /// Returns error if resampling fails
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);
        let mut output = Vec::new();
        let mut pos = 0;

        while self.pending.len() - pos >= resampler.input_frames_next() {
            let frames = resampler.input_frames_next();
            let wave: [&[f32]; 1] = [&self.pending[pos..pos + frames]];
            let out = resampler
                .process(&wave[..], None)
                .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
            output.extend_from_slice(&out[0]);
            pos += frames;
        }

        self.pending.drain(..pos);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_passthrough() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16000, 16000).unwrap(), input);
    }

    #[test]
    fn test_upsample_length() {
        let input = vec![0.0; 16000];
        let output = resample_linear(&input, 16000, 48000).unwrap();
        assert_eq!(output.len(), 48000);
    }

    #[test]
    fn test_downsample_length() {
        let input = vec![0.0; 44100];
        let output = resample_linear(&input, 44100, 16000).unwrap();
        assert_eq!(output.len(), 16000);
    }

    #[test]
    fn test_constant_signal_preserved() {
        let input = vec![0.5; 8000];
        let output = resample_linear(&input, 8000, 16000).unwrap();
        // Skip edges where the interpolator ramps in and out
        for &s in &output[100..output.len() - 100] {
            assert!((s - 0.5).abs() < 1e-3, "sample {s}");
        }
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample_linear(&[0.1], 0, 16000).is_err());
        assert!(StreamResampler::new(48000, 0).is_err());
    }

    #[test]
    fn test_stream_resampler_accumulates() {
        let mut stream = StreamResampler::new(48000, 16000).unwrap();
        let mut total = 0;
        // Device buffers of awkward sizes
        for _ in 0..100 {
            total += stream.push(&[0.25; 480]).unwrap().len();
        }
        // 48000 input frames at 1/3 ratio, minus at most one pending block
        assert!(total > 15000 && total <= 16000, "got {total}");
    }

    #[test]
    fn test_stream_passthrough() {
        let mut stream = StreamResampler::new(16000, 16000).unwrap();
        assert_eq!(stream.push(&[0.1, 0.2]).unwrap(), vec![0.1, 0.2]);
    }
}
