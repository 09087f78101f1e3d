//! Acoustic feature extraction
//!
//! A [`FeatureEncoder`] turns a mono waveform into a `[frames, dim]` matrix
//! of contextual speech features. [`Wav2Vec2Encoder`] runs an exported
//! wav2vec2-base graph through ONNX Runtime.

use std::path::Path;

use malsori_audio::{Resampler, TARGET_SAMPLE_RATE};
use ndarray::{Array2, Ix3};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{PronError, Result};

/// wav2vec2-base hidden size
pub const WAV2VEC2_BASE_DIM: usize = 768;

/// Receptive field of the wav2vec2 convolutional front end (25ms at 16kHz)
pub const MIN_SAMPLES: usize = 400;

const INPUT_NAME: &str = "input_values";
const OUTPUT_NAME: &str = "last_hidden_state";

/// Variance floor used by the wav2vec2 feature extractor
const WAVEFORM_EPS: f32 = 1e-7;

/// Waveform to frame-level features
pub trait FeatureEncoder: Send + Sync {
    /// Encode mono audio at `sample_rate` into `[frames, feature_dim]`
    fn encode(&self, waveform: &[f32], sample_rate: u32) -> Result<Array2<f32>>;

    fn feature_dim(&self) -> usize;
}

/// Zero-mean, unit-variance copy of `samples`
pub fn normalize_waveform(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    let inv_std = 1.0 / (var + WAVEFORM_EPS).sqrt();
    samples.iter().map(|s| (s - mean) * inv_std).collect()
}

/// Resample to 16kHz when needed and check the clip is long enough
pub fn prepare_waveform(waveform: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    let samples = if sample_rate == TARGET_SAMPLE_RATE {
        waveform.to_vec()
    } else {
        Resampler::new(sample_rate, TARGET_SAMPLE_RATE)?.process(waveform)?
    };

    if samples.len() < MIN_SAMPLES {
        return Err(PronError::invalid_input(format!(
            "Audio too short: {} samples at {} Hz (need at least {})",
            samples.len(),
            TARGET_SAMPLE_RATE,
            MIN_SAMPLES
        )));
    }
    Ok(normalize_waveform(&samples))
}

/// wav2vec2 encoder backed by an ONNX Runtime session
pub struct Wav2Vec2Encoder {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    feature_dim: usize,
}

impl Wav2Vec2Encoder {
    /// Load an exported wav2vec2 graph (`input_values` -> `last_hidden_state`)
    pub fn new<P: AsRef<Path>>(model_path: P, num_threads: usize, feature_dim: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(PronError::model_load(format!(
                "Encoder model not found: {}",
                model_path.display()
            )));
        }

        info!("Loading wav2vec2 encoder from {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| PronError::model_load(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PronError::model_load(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| PronError::model_load(format!("Failed to set intra threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| PronError::model_load(format!("Failed to load encoder: {}", e)))?;
        info!("Encoder loaded ({} threads)", num_threads.max(1));

        Ok(Self {
            session: Mutex::new(session),
            feature_dim,
        })
    }
}

impl FeatureEncoder for Wav2Vec2Encoder {
    fn encode(&self, waveform: &[f32], sample_rate: u32) -> Result<Array2<f32>> {
        let samples = prepare_waveform(waveform, sample_rate)?;
        let n_samples = samples.len();

        let input = Array2::from_shape_vec((1, n_samples), samples)?;
        let input_value = Tensor::from_array(input)?;

        let hidden = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![INPUT_NAME => input_value])
                .map_err(|e| PronError::inference(format!("Encoder run failed: {}", e)))?;

            outputs[OUTPUT_NAME]
                .try_extract_array::<f32>()
                .map_err(|e| PronError::inference(format!("Failed to extract {}: {}", OUTPUT_NAME, e)))?
                .to_owned()
        };

        let hidden = hidden.into_dimensionality::<Ix3>().map_err(|_| {
            PronError::shape(format!("{} should be [1, frames, dim]", OUTPUT_NAME))
        })?;
        let (batch, frames, dim) = hidden.dim();
        if batch != 1 || dim != self.feature_dim {
            return Err(PronError::shape(format!(
                "Encoder returned [{}, {}, {}], expected [1, frames, {}]",
                batch, frames, dim, self.feature_dim
            )));
        }

        debug!("Encoded {} samples into {} frames", n_samples, frames);
        Ok(hidden.into_shape_with_order((frames, dim))?)
    }

    fn feature_dim(&self) -> usize {
        self.feature_dim
    }
}
