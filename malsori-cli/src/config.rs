//! Configuration management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use malsori_paths::{
    resolve_against, ModelPaths, CLASSIFIER_FILE, ENCODER_FILE, FEATURE_STATS_FILE,
    PHONEME_TABLE_FILE,
};
use malsori_pron::{ModelConfig, ScoringConfig};
use serde::{Deserialize, Serialize};

/// CLI configuration, stored as TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MalsoriConfig {
    /// Path this config was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory holding the model artifacts (None = platform models dir)
    pub model_dir: Option<PathBuf>,

    /// Artifact file names, relative to `model_dir` unless absolute
    pub classifier_file: PathBuf,
    pub phoneme_table_file: PathBuf,
    pub feature_stats_file: PathBuf,
    pub encoder_file: PathBuf,

    /// Threads for ONNX Runtime
    pub num_threads: usize,

    /// Classifier attention heads (not recoverable from the weights)
    pub heads: usize,

    /// Optional cap on classifier input frames
    pub max_positions: Option<usize>,

    /// Encoder output width (768 for wav2vec2-base)
    pub feature_dim: usize,

    pub scoring: ScoringConfig,
}

impl Default for MalsoriConfig {
    fn default() -> Self {
        let model = ModelConfig::new(ModelPaths::in_dir(""));
        Self {
            config_path: PathBuf::new(),
            model_dir: None,
            classifier_file: PathBuf::from(CLASSIFIER_FILE),
            phoneme_table_file: PathBuf::from(PHONEME_TABLE_FILE),
            feature_stats_file: PathBuf::from(FEATURE_STATS_FILE),
            encoder_file: PathBuf::from(ENCODER_FILE),
            num_threads: model.num_threads,
            heads: model.heads,
            max_positions: model.max_positions,
            feature_dim: model.feature_dim,
            scoring: model.scoring,
        }
    }
}

impl MalsoriConfig {
    /// Load from `path` (or the platform config path), creating a default
    /// file if none exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => malsori_paths::get_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;

            let mut config: MalsoriConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to `config_path`
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Model directory, falling back to the platform default
    pub fn resolved_model_dir(&self) -> Result<PathBuf> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => malsori_paths::get_models_dir(),
        }
    }

    /// Model settings for `malsori-pron`, with artifact paths resolved
    pub fn model_config(&self) -> Result<ModelConfig> {
        let dir = self.resolved_model_dir()?;
        let paths = ModelPaths {
            classifier: resolve_against(&self.classifier_file, &dir),
            phoneme_table: resolve_against(&self.phoneme_table_file, &dir),
            feature_stats: resolve_against(&self.feature_stats_file, &dir),
            encoder: resolve_against(&self.encoder_file, &dir),
        };

        Ok(ModelConfig {
            paths,
            num_threads: self.num_threads,
            heads: self.heads,
            max_positions: self.max_positions,
            feature_dim: self.feature_dim,
            scoring: self.scoring,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use malsori_pron::AlignmentStrategy;

    #[test]
    fn test_default_file_created_on_first_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = MalsoriConfig::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert_eq!(config.heads, 4);
        assert_eq!(config.feature_dim, 768);

        // Reloading the written file gives the same settings
        let reloaded = MalsoriConfig::load(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "model_dir = \"/srv/malsori\"\nnum_threads = 2\n\n[scoring]\nalignment = \"positional\"\n",
        )
        .unwrap();

        let config = MalsoriConfig::load(Some(&path)).unwrap();
        assert_eq!(config.num_threads, 2);
        assert_eq!(config.scoring.alignment, AlignmentStrategy::Positional);
        assert_eq!(config.scoring.word_error_threshold, 0.2);
        assert_eq!(config.encoder_file, PathBuf::from(ENCODER_FILE));
    }

    #[test]
    fn test_artifacts_resolved_against_model_dir() {
        let config = MalsoriConfig {
            model_dir: Some(PathBuf::from("/srv/malsori")),
            encoder_file: PathBuf::from("/mnt/shared/wav2vec2.onnx"),
            ..MalsoriConfig::default()
        };
        let model = config.model_config().unwrap();
        assert_eq!(
            model.paths.classifier,
            PathBuf::from("/srv/malsori").join(CLASSIFIER_FILE)
        );
        assert_eq!(model.paths.encoder, PathBuf::from("/mnt/shared/wav2vec2.onnx"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "num_threads = \"many\"").unwrap();
        assert!(MalsoriConfig::load(Some(&path)).is_err());
    }
}
