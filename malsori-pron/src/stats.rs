//! Global feature normalisation statistics

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PronError, Result};

/// Added to `std` so a zero deviation never divides by zero
const STD_EPSILON: f32 = 1e-8;

/// Scalar mean/std computed over the classifier's training features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f32,
    pub std: f32,
}

impl Default for FeatureStats {
    fn default() -> Self {
        Self::identity()
    }
}

impl FeatureStats {
    pub fn identity() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
        }
    }

    /// Read `{"mean": .., "std": ..}`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let stats: Self = serde_json::from_str(&content)?;
        if !stats.mean.is_finite() || !stats.std.is_finite() || stats.std < 0.0 {
            return Err(PronError::model_load(format!(
                "Invalid feature stats in {}: mean={}, std={}",
                path.display(),
                stats.mean,
                stats.std
            )));
        }
        info!("Feature stats: mean={:.4}, std={:.4}", stats.mean, stats.std);
        Ok(stats)
    }

    /// Load `path`, or fall back to identity when the file is absent
    pub fn load_or_identity<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_json_file(path)
        } else {
            warn!(
                "Feature stats {} not found, features will not be normalised",
                path.display()
            );
            Ok(Self::identity())
        }
    }

    /// `(x - mean) / (std + 1e-8)` for every element, in place
    pub fn apply(&self, features: &mut Array2<f32>) {
        let denom = self.std + STD_EPSILON;
        let mean = self.mean;
        features.mapv_inplace(|x| (x - mean) / denom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_apply() {
        let stats = FeatureStats {
            mean: 1.0,
            std: 2.0,
        };
        let mut x = array![[1.0f32, 3.0], [-1.0, 5.0]];
        stats.apply(&mut x);
        assert_abs_diff_eq!(x[[0, 0]], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(x[[0, 1]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(x[[1, 0]], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(x[[1, 1]], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_identity_is_noop() {
        let mut x = array![[0.25f32, -4.0]];
        FeatureStats::identity().apply(&mut x);
        assert_abs_diff_eq!(x[[0, 0]], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(x[[0, 1]], -4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_load_or_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wav2vec2_stats.json");
        assert_eq!(
            FeatureStats::load_or_identity(&path).unwrap(),
            FeatureStats::identity()
        );

        fs::write(&path, r#"{"mean": -0.02, "std": 0.31}"#).unwrap();
        let stats = FeatureStats::load_or_identity(&path).unwrap();
        assert_abs_diff_eq!(stats.mean, -0.02, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.std, 0.31, epsilon = 1e-6);

        fs::write(&path, r#"{"mean": 0.0}"#).unwrap();
        assert!(FeatureStats::load_or_identity(&path).is_err());
    }
}
