//! Pronunciation-check façade
//!
//! [`ModelHandle`] owns every loaded artifact and is immutable once built.
//! [`PronunciationChecker`] wraps a handle (or the reason there is none) and
//! turns each request into either a scored result or an "unavailable"
//! outcome. [`LazyChecker`] defers loading to the first request.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use malsori_audio::{load_for_model, TARGET_SAMPLE_RATE};
use malsori_paths::ModelPaths;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::conformer::{ConformerClassifier, ConformerDims, ConformerOptions, DEFAULT_HEADS};
use crate::ctc::{greedy_decode, ids_to_phonemes};
use crate::encoder::{FeatureEncoder, Wav2Vec2Encoder, WAV2VEC2_BASE_DIM};
use crate::error::{PronError, Result};
use crate::phoneme::Phoneme;
use crate::result::PronunciationResult;
use crate::scoring::{score_text, ScoringConfig};
use crate::stats::FeatureStats;
use crate::table::PhonemeTable;

/// Everything needed to load a [`ModelHandle`]
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub paths: ModelPaths,
    /// ONNX Runtime intra-op threads for the encoder
    pub num_threads: usize,
    /// Attention heads in the classifier
    pub heads: usize,
    /// Optional cap on classifier input frames
    pub max_positions: Option<usize>,
    /// Encoder output width
    pub feature_dim: usize,
    pub scoring: ScoringConfig,
}

impl ModelConfig {
    /// Default artifact names inside `dir`
    pub fn from_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self::new(ModelPaths::in_dir(dir.into()))
    }

    pub fn new(paths: ModelPaths) -> Self {
        Self {
            paths,
            num_threads: 4,
            heads: DEFAULT_HEADS,
            max_positions: None,
            feature_dim: WAV2VEC2_BASE_DIM,
            scoring: ScoringConfig::default(),
        }
    }

    fn conformer_options(&self) -> ConformerOptions {
        ConformerOptions {
            heads: self.heads,
            max_positions: self.max_positions,
        }
    }
}

/// Loaded encoder, classifier, class table and feature statistics
pub struct ModelHandle {
    encoder: Box<dyn FeatureEncoder>,
    classifier: ConformerClassifier,
    table: PhonemeTable,
    stats: FeatureStats,
    model_dir: Option<PathBuf>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("classifier", &self.classifier.dims())
            .field("classes", &self.table.len())
            .field("stats", &self.stats)
            .field("model_dir", &self.model_dir)
            .finish()
    }
}

impl ModelHandle {
    /// Load all artifacts named by `config`
    ///
    /// A missing class table or stats file falls back to defaults; a missing
    /// or inconsistent classifier or encoder is an error.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let paths = &config.paths;
        info!("Loading pronunciation model");
        info!("  classifier: {}", paths.classifier.display());
        info!("  phoneme table: {}", paths.phoneme_table.display());
        info!("  feature stats: {}", paths.feature_stats.display());
        info!("  encoder: {}", paths.encoder.display());

        let table = PhonemeTable::load_or_fallback(&paths.phoneme_table)?;
        let stats = FeatureStats::load_or_identity(&paths.feature_stats)?;

        if !paths.classifier.exists() {
            return Err(PronError::model_load(format!(
                "Classifier weights not found: {}",
                paths.classifier.display()
            )));
        }
        let classifier = ConformerClassifier::load(&paths.classifier, config.conformer_options())?;
        let encoder = Wav2Vec2Encoder::new(&paths.encoder, config.num_threads, config.feature_dim)?;

        let mut handle = Self::from_parts(Box::new(encoder), classifier, table, stats)?;
        handle.model_dir = paths.model_dir().map(|p| p.to_path_buf());
        info!(
            "Pronunciation model ready: {} classes, blank_id {}",
            handle.table.len(),
            handle.table.blank_id()
        );
        Ok(handle)
    }

    /// Assemble a handle from already-loaded parts, checking they agree
    pub fn from_parts(
        encoder: Box<dyn FeatureEncoder>,
        classifier: ConformerClassifier,
        table: PhonemeTable,
        stats: FeatureStats,
    ) -> Result<Self> {
        if classifier.num_classes() != table.len() {
            return Err(PronError::model_load(format!(
                "Classifier has {} output classes but the phoneme table has {}",
                classifier.num_classes(),
                table.len()
            )));
        }
        if classifier.input_dim() != encoder.feature_dim() {
            return Err(PronError::model_load(format!(
                "Classifier expects {}-dim features but the encoder produces {}",
                classifier.input_dim(),
                encoder.feature_dim()
            )));
        }
        Ok(Self {
            encoder,
            classifier,
            table,
            stats,
            model_dir: None,
        })
    }

    /// Recognise the phonemes spoken in a mono waveform
    ///
    /// Sentinel symbols are removed from the output.
    pub fn recognize(&self, waveform: &[f32], sample_rate: u32) -> Result<Vec<Phoneme>> {
        let mut features = self.encoder.encode(waveform, sample_rate)?;
        self.stats.apply(&mut features);

        let log_probs = self.classifier.forward(features.view())?;
        let ids = greedy_decode(log_probs.view(), self.table.blank_id());
        debug!(
            "Decoded {} frames into {} class IDs",
            log_probs.nrows(),
            ids.len()
        );
        Ok(ids_to_phonemes(&ids, &self.table))
    }

    pub fn table(&self) -> &PhonemeTable {
        &self.table
    }

    pub fn classifier(&self) -> &ConformerClassifier {
        &self.classifier
    }

    pub fn stats(&self) -> FeatureStats {
        self.stats
    }
}

/// Why a request could not be scored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The model failed to load; no audio was touched
    ModelNotLoaded(String),
    /// The audio bytes could not be decoded
    AudioDecode(String),
    /// Feature extraction or classification failed for this request
    Inference(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelNotLoaded(msg) => write!(f, "model not loaded: {}", msg),
            Self::AudioDecode(msg) => write!(f, "audio could not be decoded: {}", msg),
            Self::Inference(msg) => write!(f, "inference failed: {}", msg),
        }
    }
}

/// Result of a single pronunciation check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum CheckOutcome {
    Scored(PronunciationResult),
    Unavailable(UnavailableReason),
}

impl CheckOutcome {
    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Scored(_))
    }

    pub fn result(&self) -> Option<&PronunciationResult> {
        match self {
            Self::Scored(result) => Some(result),
            Self::Unavailable(_) => None,
        }
    }

    pub fn into_result(self) -> Option<PronunciationResult> {
        match self {
            Self::Scored(result) => Some(result),
            Self::Unavailable(_) => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&UnavailableReason> {
        match self {
            Self::Scored(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }
}

/// Snapshot of the checker's model state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub available: bool,
    pub reason: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub num_classes: Option<usize>,
    pub feature_dim: Option<usize>,
    pub blank_id: Option<usize>,
    pub stats: Option<FeatureStats>,
    pub classifier: Option<ConformerDims>,
}

#[derive(Debug, Clone)]
enum Availability {
    Ready(Arc<ModelHandle>),
    Unavailable(String),
}

/// Scores recordings against target text, or reports why it cannot
#[derive(Debug, Clone)]
pub struct PronunciationChecker {
    availability: Availability,
    scoring: ScoringConfig,
    model_dir: Option<PathBuf>,
}

impl PronunciationChecker {
    /// Load the model; a failure leaves the checker unavailable
    pub fn load(config: &ModelConfig) -> Self {
        let model_dir = config.paths.model_dir().map(|p| p.to_path_buf());
        let availability = match ModelHandle::load(config) {
            Ok(handle) => Availability::Ready(Arc::new(handle)),
            Err(e) => {
                error!("Pronunciation model unavailable: {}", e);
                Availability::Unavailable(e.to_string())
            }
        };
        Self {
            availability,
            scoring: config.scoring,
            model_dir,
        }
    }

    pub fn from_handle(handle: Arc<ModelHandle>, scoring: ScoringConfig) -> Self {
        let model_dir = handle.model_dir.clone();
        Self {
            availability: Availability::Ready(handle),
            scoring,
            model_dir,
        }
    }

    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self {
            availability: Availability::Unavailable(reason.into()),
            scoring: ScoringConfig::default(),
            model_dir: None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.availability, Availability::Ready(_))
    }

    pub fn handle(&self) -> Option<&Arc<ModelHandle>> {
        match &self.availability {
            Availability::Ready(handle) => Some(handle),
            Availability::Unavailable(_) => None,
        }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    fn ready(&self) -> std::result::Result<&ModelHandle, UnavailableReason> {
        match &self.availability {
            Availability::Ready(handle) => Ok(handle),
            Availability::Unavailable(reason) => {
                Err(UnavailableReason::ModelNotLoaded(reason.clone()))
            }
        }
    }

    /// Score an encoded recording against `expected_text`
    ///
    /// `format_hint` is a file extension or MIME type; `sample_rate` is
    /// only used for headerless PCM.
    pub fn check(
        &self,
        audio: &[u8],
        expected_text: &str,
        sample_rate: u32,
        format_hint: &str,
    ) -> CheckOutcome {
        let handle = match self.ready() {
            Ok(handle) => handle,
            Err(reason) => return CheckOutcome::Unavailable(reason),
        };

        let waveform = match load_for_model(audio, format_hint, sample_rate) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Could not decode {} audio: {}", format_hint, e);
                return CheckOutcome::Unavailable(UnavailableReason::AudioDecode(e.to_string()));
            }
        };

        self.score_waveform(handle, &waveform, TARGET_SAMPLE_RATE, expected_text)
    }

    /// Score an already-decoded mono waveform
    pub fn check_waveform(
        &self,
        waveform: &[f32],
        sample_rate: u32,
        expected_text: &str,
    ) -> CheckOutcome {
        match self.ready() {
            Ok(handle) => self.score_waveform(handle, waveform, sample_rate, expected_text),
            Err(reason) => CheckOutcome::Unavailable(reason),
        }
    }

    fn score_waveform(
        &self,
        handle: &ModelHandle,
        waveform: &[f32],
        sample_rate: u32,
        expected_text: &str,
    ) -> CheckOutcome {
        let predicted = match handle.recognize(waveform, sample_rate) {
            Ok(predicted) => predicted,
            Err(e) => {
                error!("Pronunciation inference failed: {}", e);
                return CheckOutcome::Unavailable(UnavailableReason::Inference(e.to_string()));
            }
        };

        let result = score_text(expected_text, &predicted, &self.scoring);
        info!(
            "Pronunciation check: {:.1}% accuracy, PER {:.4}",
            result.phoneme_accuracy, result.per
        );
        CheckOutcome::Scored(result)
    }

    pub fn status(&self) -> ModelStatus {
        match &self.availability {
            Availability::Ready(handle) => ModelStatus {
                available: true,
                reason: None,
                model_dir: self.model_dir.clone(),
                num_classes: Some(handle.table.len()),
                feature_dim: Some(handle.encoder.feature_dim()),
                blank_id: Some(handle.table.blank_id()),
                stats: Some(handle.stats),
                classifier: Some(handle.classifier.dims()),
            },
            Availability::Unavailable(reason) => ModelStatus {
                available: false,
                reason: Some(reason.clone()),
                model_dir: self.model_dir.clone(),
                num_classes: None,
                feature_dim: None,
                blank_id: None,
                stats: None,
                classifier: None,
            },
        }
    }
}

/// Checker that loads its model on first use
///
/// Concurrent first callers share a single load. A failed load is kept and
/// reported on every call rather than retried.
#[derive(Debug)]
pub struct LazyChecker {
    config: ModelConfig,
    checker: OnceLock<PronunciationChecker>,
}

impl LazyChecker {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            checker: OnceLock::new(),
        }
    }

    pub fn get(&self) -> &PronunciationChecker {
        self.checker
            .get_or_init(|| PronunciationChecker::load(&self.config))
    }

    pub fn is_initialized(&self) -> bool {
        self.checker.get().is_some()
    }

    pub fn check(
        &self,
        audio: &[u8],
        expected_text: &str,
        sample_rate: u32,
        format_hint: &str,
    ) -> CheckOutcome {
        self.get().check(audio, expected_text, sample_rate, format_hint)
    }

    pub fn status(&self) -> ModelStatus {
        self.get().status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_checker_returns_immediately() {
        let checker = PronunciationChecker::unavailable("weights missing");
        assert!(!checker.is_available());

        // Not even valid audio: must not be decoded
        let outcome = checker.check(b"", "안녕", 16000, "wav");
        assert_eq!(
            outcome,
            CheckOutcome::Unavailable(UnavailableReason::ModelNotLoaded("weights missing".into()))
        );
        assert!(outcome.result().is_none());

        let status = checker.status();
        assert!(!status.available);
        assert_eq!(status.reason.as_deref(), Some("weights missing"));
    }

    #[test]
    fn test_load_from_empty_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let checker = PronunciationChecker::load(&ModelConfig::from_dir(dir.path()));
        assert!(!checker.is_available());
        let reason = checker.status().reason.unwrap();
        assert!(reason.contains("Classifier weights not found"), "{}", reason);
    }

    #[test]
    fn test_lazy_checker_remembers_failure() {
        let dir = tempfile::tempdir().unwrap();
        let lazy = LazyChecker::new(ModelConfig::from_dir(dir.path()));
        assert!(!lazy.is_initialized());

        let first = lazy.check(b"RIFF", "가", 16000, "wav");
        assert!(lazy.is_initialized());
        assert!(matches!(
            first,
            CheckOutcome::Unavailable(UnavailableReason::ModelNotLoaded(_))
        ));
        assert!(std::ptr::eq(lazy.get(), lazy.get()));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = CheckOutcome::Unavailable(UnavailableReason::AudioDecode("bad header".into()));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["data"]["reason"], "audio_decode");
        assert_eq!(json["data"]["detail"], "bad header");
    }
}
