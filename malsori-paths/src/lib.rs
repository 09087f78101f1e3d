//! Cross-platform path utilities for Malsori.
//!
//! Single source of truth for where configuration and model artifacts live.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/malsori` | `~/.config/malsori` |
//! | macOS    | `~/Library/Application Support/malsori` | Same as data dir |
//! | Windows  | `%APPDATA%/malsori` | Same as data dir |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "malsori";

/// Configuration file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Trained Conformer weights (safetensors).
pub const CLASSIFIER_FILE: &str = "pronunciation_model.safetensors";

/// Phoneme symbol to class ID table (flat JSON object).
pub const PHONEME_TABLE_FILE: &str = "p2id.json";

/// Feature normalisation statistics (`{"mean": .., "std": ..}`).
pub const FEATURE_STATS_FILE: &str = "wav2vec2_stats.json";

/// Wav2Vec2 encoder exported to ONNX.
pub const ENCODER_FILE: &str = "wav2vec2_base.onnx";

/// Resolved locations of every model artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub classifier: PathBuf,
    pub phoneme_table: PathBuf,
    pub feature_stats: PathBuf,
    pub encoder: PathBuf,
}

impl ModelPaths {
    /// Default artifact names inside `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            classifier: dir.join(CLASSIFIER_FILE),
            phoneme_table: dir.join(PHONEME_TABLE_FILE),
            feature_stats: dir.join(FEATURE_STATS_FILE),
            encoder: dir.join(ENCODER_FILE),
        }
    }

    /// The directory holding the classifier weights.
    pub fn model_dir(&self) -> Option<&Path> {
        self.classifier.parent()
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_against<P: AsRef<Path>, B: AsRef<Path>>(path: P, base: B) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.as_ref().join(path)
    }
}

fn ensure_dir(dir: &Path, secure: bool) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    if secure {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }
    #[cfg(not(unix))]
    let _ = secure;

    Ok(())
}

/// Get the application data directory.
///
/// Creates the directory if it doesn't exist with secure permissions (0o700).
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_dir(&data_dir, true)?;
    Ok(data_dir)
}

/// Get the models directory (`<data_dir>/models` on all platforms).
pub fn get_models_dir() -> Result<PathBuf> {
    let models_dir = get_data_dir()?.join("models");
    ensure_dir(&models_dir, false)?;
    Ok(models_dir)
}

/// Get the configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/malsori`
/// - **macOS / Windows**: config lives with data
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_dir(&config_dir, true)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Path of the TOML configuration file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}
