//! Clip resampling with rubato
//!
//! Converts a whole mono recording to the encoder rate (16kHz) in one pass.

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::error::{AudioError, Result};

/// Upper bound on flush passes when draining the sinc filter delay.
const MAX_FLUSH_PASSES: usize = 4;

/// Resampler for converting a mono clip to a target sample rate
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
}

impl Resampler {
    /// Create new resampler
    ///
    /// # Arguments
    ///
    /// * `source_rate` - Source sample rate (e.g., 48000)
    /// * `target_rate` - Target sample rate (typically 16000)
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        Ok(Self {
            source_rate,
            target_rate,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.source_rate == self.target_rate
    }

    fn interpolation_params() -> SincInterpolationParameters {
        SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        }
    }

    /// Resample a complete mono clip
    ///
    /// The sinc filter delay is trimmed, so the output is time-aligned with the
    /// input and has `expected_output_len(input.len())` samples.
    pub fn process(&self, input: &[f32]) -> Result<Vec<f32>> {
        if self.is_passthrough() {
            return Ok(input.to_vec());
        }

        if input.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Resampling {} samples from {} Hz to {} Hz",
            input.len(),
            self.source_rate,
            self.target_rate
        );

        let mut resampler = SincFixedIn::<f32>::new(
            self.target_rate as f64 / self.source_rate as f64,
            2.0, // max_resample_ratio_relative
            Self::interpolation_params(),
            input.len(),
            1,
        )
        .map_err(|e| AudioError::ResampleError(format!("Failed to create resampler: {:?}", e)))?;

        let delay = resampler.output_delay();
        let wanted = delay + self.expected_output_len(input.len());

        let mut output = resampler
            .process(&[input], None)
            .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?
            .into_iter()
            .next()
            .unwrap_or_default();

        // Drain the filter tail so the last input samples make it out
        for _ in 0..MAX_FLUSH_PASSES {
            if output.len() >= wanted {
                break;
            }
            let tail = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(|e| AudioError::ResampleError(format!("Resampler flush failed: {:?}", e)))?;
            match tail.into_iter().next() {
                Some(samples) if !samples.is_empty() => output.extend_from_slice(&samples),
                _ => break,
            }
        }

        let end = wanted.min(output.len());
        let start = delay.min(end);
        Ok(output[start..end].to_vec())
    }

    /// Down-mix interleaved audio to mono by averaging channels
    pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
        match channels {
            0 | 1 => interleaved.to_vec(),
            n => interleaved
                .chunks(n as usize)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect(),
        }
    }

    /// Get expected output length for given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        if self.is_passthrough() {
            return input_len;
        }

        (input_len as f64 * self.target_rate as f64 / self.source_rate as f64).round() as usize
    }
}
