//! Run configuration.

use std::path::Path;

use cell_store::CellStoreConfig;
use serde::{Deserialize, Serialize};
use smap_common::DEFAULT_TILE_SIZE;

use crate::error::{RepurposeError, Result};

/// What to do when a timestamp has no image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingImagePolicy {
    /// Log a warning and continue with the next timestamp.
    #[default]
    Skip,
    /// Stop the run before anything is committed.
    Abort,
}

impl MissingImagePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Configuration of a repurposing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepurposeConfig {
    /// Cell size in degrees.
    pub tile_size: f64,

    /// Number of images accumulated before cells are flushed to disk.
    pub image_buffer: usize,

    /// Worker threads for per-cell work; 0 uses all cores.
    pub workers: usize,

    pub missing_images: MissingImagePolicy,

    /// Archive layout and compression.
    pub store: CellStoreConfig,
}

impl Default for RepurposeConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            image_buffer: 200,
            workers: 0,
            missing_images: MissingImagePolicy::Skip,
            store: CellStoreConfig::default(),
        }
    }
}

impl RepurposeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            store: CellStoreConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("SMAP_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.tile_size = size;
            }
        }

        if let Ok(val) = std::env::var("SMAP_IMAGE_BUFFER") {
            if let Ok(n) = val.parse() {
                config.image_buffer = n;
            }
        }

        if let Ok(val) = std::env::var("SMAP_WORKERS") {
            if let Ok(n) = val.parse() {
                config.workers = n;
            }
        }

        if let Ok(val) = std::env::var("SMAP_MISSING_IMAGES") {
            if let Some(policy) = MissingImagePolicy::from_str(&val) {
                config.missing_images = policy;
            }
        }

        config
    }

    /// Load configuration from a YAML file; absent keys keep their defaults.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            RepurposeError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 || self.tile_size > 180.0 {
            return Err(format!("tile_size must be in (0, 180], got {}", self.tile_size));
        }

        if self.image_buffer == 0 {
            return Err("image_buffer must be > 0".to_string());
        }

        self.store.validate()
    }
}
