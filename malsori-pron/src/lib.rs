//! Malsori Korean pronunciation scoring
//!
//! Phoneme-level feedback for Korean learners: the target sentence is
//! decomposed into jamo, the recording is recognised with a wav2vec2
//! encoder feeding a Conformer CTC classifier, and the two phoneme
//! sequences are aligned and scored.
//!
//! ## Features
//!
//! - Rule-based Hangul G2P (lead / vowel / tail jamo)
//! - wav2vec2 features via ONNX Runtime
//! - Conformer classifier on candle, loaded from safetensors weights
//! - Greedy CTC decoding
//! - Levenshtein scoring with alignment, per-category and per-word breakdown
//!
//! ## Quick Start
//!
//! ```no_run
//! use malsori_pron::{CheckOutcome, ModelConfig, PronunciationChecker};
//!
//! let config = ModelConfig::from_dir("/opt/malsori/models");
//! let checker = PronunciationChecker::load(&config);
//!
//! let audio = std::fs::read("recording.wav")?;
//! match checker.check(&audio, "안녕하세요", 16000, "wav") {
//!     CheckOutcome::Scored(result) => println!("accuracy: {}%", result.phoneme_accuracy),
//!     CheckOutcome::Unavailable(reason) => println!("not scored: {}", reason),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checker;
pub mod conformer; // Conformer forward pass on candle
pub mod ctc;
pub mod encoder; // wav2vec2 via ONNX Runtime
pub mod error;
pub mod g2p;
pub mod phoneme;
pub mod result;
pub mod scoring;
pub mod stats;
pub mod table;
pub mod text_accuracy;

pub use checker::{
    CheckOutcome, LazyChecker, ModelConfig, ModelHandle, ModelStatus, PronunciationChecker,
    UnavailableReason,
};
pub use conformer::{ConformerClassifier, ConformerDims, ConformerOptions};
pub use encoder::{FeatureEncoder, Wav2Vec2Encoder};
pub use error::{PronError, Result};
pub use g2p::{decompose, decompose_words};
pub use phoneme::{Phoneme, PhonemeCategory};
pub use result::{AlignedPhoneme, CategoryErrors, EditKind, PhonemePair, PronunciationResult, WordScore};
pub use scoring::{score, score_text, AlignmentStrategy, ScoringConfig, WordSpanStrategy};
pub use stats::FeatureStats;
pub use table::PhonemeTable;
pub use text_accuracy::{word_accuracy, WordAccuracy};
