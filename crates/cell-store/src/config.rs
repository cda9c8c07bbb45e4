//! Configuration of archive layout and compression.

use serde::{Deserialize, Serialize};

/// Configuration for writing cell archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellStoreConfig {
    /// Compression codec for variable arrays.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,

    /// Chunk length along the point dimension.
    pub point_chunk: usize,

    /// Chunk length along the time dimension.
    pub time_chunk: usize,
}

impl Default for CellStoreConfig {
    fn default() -> Self {
        Self {
            compression: ZarrCompression::BloscLz4,
            compression_level: 5,
            shuffle: true,
            point_chunk: 64,
            time_chunk: 365,
        }
    }
}

impl CellStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            config.compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            config.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("ZARR_POINT_CHUNK") {
            if let Ok(size) = val.parse() {
                config.point_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_TIME_CHUNK") {
            if let Ok(size) = val.parse() {
                config.time_chunk = size;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.point_chunk == 0 {
            return Err("point_chunk must be > 0".to_string());
        }

        if self.time_chunk == 0 {
            return Err("time_chunk must be > 0".to_string());
        }

        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err("compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    #[default]
    BloscLz4,
    /// Blosc with Zstd.
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "zstd" | "blosc_zstd" => Self::BloscZstd,
            _ => Self::BloscLz4,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        assert!(CellStoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let config = CellStoreConfig {
            time_chunk: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CellStoreConfig {
            compression_level: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CellStoreConfig {
            compression: ZarrCompression::None,
            compression_level: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!(ZarrCompression::from_str("NONE"), ZarrCompression::None);
        assert_eq!(ZarrCompression::from_str("blosc_zstd"), ZarrCompression::BloscZstd);
        assert_eq!(ZarrCompression::from_str("whatever"), ZarrCompression::BloscLz4);
    }
}
