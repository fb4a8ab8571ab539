//! Runtime settings shared by the library entry points and the CLI.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{DEFAULT_CONSENSUS_QUALITY, HIGH_QUALITY_THRESHOLD};
use crate::store::{StoreBuilder, StoreHint, DEFAULT_CHANNEL_CAPACITY};
use crate::visitor::collect::BuildOptions;
use crate::writing::AceWriter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings loadable from a JSON file; missing keys take their defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AceConfig {
    /// Bases below this quality are written in lowercase
    pub quality_threshold: u8,

    /// Consensus quality used when a contig has no `BQ` block
    pub placeholder_quality: u8,

    /// Write `BS` records
    pub base_segments: bool,

    /// Contigs buffered by the streaming store
    pub channel_capacity: usize,

    pub store: StoreHint,
}

impl Default for AceConfig {
    fn default() -> Self {
        Self {
            quality_threshold: HIGH_QUALITY_THRESHOLD,
            placeholder_quality: DEFAULT_CONSENSUS_QUALITY,
            base_segments: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            store: StoreHint::default(),
        }
    }
}

impl AceConfig {
    /// Load settings from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, is not valid JSON,
    /// or holds invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse settings from a JSON string
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` on malformed JSON and
    /// `ConfigError::Invalid` on out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::default().with_placeholder_quality(self.placeholder_quality)
    }

    /// Store builder for the configured strategy
    #[must_use]
    pub fn store_builder(&self) -> StoreBuilder {
        self.store_builder_for(self.store)
    }

    /// Store builder with these settings but another strategy
    #[must_use]
    pub fn store_builder_for(&self, hint: StoreHint) -> StoreBuilder {
        StoreBuilder::new(hint)
            .with_options(self.build_options())
            .with_channel_capacity(self.channel_capacity)
    }

    /// Apply the output settings to a writer
    #[must_use]
    pub fn configure_writer<W: Write>(&self, writer: AceWriter<W>) -> AceWriter<W> {
        writer
            .with_quality_threshold(self.quality_threshold)
            .with_base_segments(self.base_segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_keys() {
        let config = AceConfig::from_json(r#"{"base_segments": true}"#).unwrap();
        assert!(config.base_segments);
        assert_eq!(config.quality_threshold, 26);
        assert_eq!(config.placeholder_quality, 30);
        assert_eq!(config.store, StoreHint::InMemory);
    }

    #[test]
    fn test_store_hint_by_name() {
        let config = AceConfig::from_json(r#"{"store": "indexed", "channel_capacity": 16}"#).unwrap();
        assert_eq!(config.store, StoreHint::Indexed);
        assert_eq!(config.channel_capacity, 16);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            AceConfig::from_json(r#"{"channel_capacity": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AceConfig::from_json(r#"{"quality_threshold": 300}"#),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AceConfig {
            placeholder_quality: 12,
            ..AceConfig::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(AceConfig::load_from_file(&path).unwrap(), config);
        assert!(matches!(
            AceConfig::load_from_file(&dir.path().join("missing.json")),
            Err(ConfigError::ReadError(_))
        ));
    }
}
