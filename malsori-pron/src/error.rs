//! Error types for pronunciation scoring

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PronError>;

#[derive(Error, Debug)]
pub enum PronError {
    #[error("Model loading error: {0}")]
    ModelLoadError(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Phoneme table error: {0}")]
    PhonemeTable(String),

    #[error("Audio error: {0}")]
    Audio(#[from] malsori_audio::AudioError),

    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ndarray shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PronError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn shape<S: Into<String>>(msg: S) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn phoneme_table<S: Into<String>>(msg: S) -> Self {
        Self::PhonemeTable(msg.into())
    }
}
