//! Configuration handling for the pasa-lite CLI
//!
//! Supports loading configuration from pasa_lite.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use pasa_lite_core::ValidationOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "pasa_lite.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Scaffolds validated concurrently
    #[serde(default = "default_cpu")]
    pub cpu: usize,

    /// Prefix of the two output files
    #[serde(default = "default_out_prefix")]
    pub out_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum average percent identity of a valid alignment
    #[serde(default = "default_min_per_id")]
    pub min_per_id: f64,

    /// Reject single-segment alignments
    #[serde(default)]
    pub discard_unspliced: bool,

    /// Take the aligner's strand as the transcribed strand
    #[serde(default)]
    pub transcribed_is_aligned_orient: bool,

    /// Reject multi-exon alignments with any non-canonical intron
    #[serde(default)]
    pub require_consensus_splice_sites: bool,
}

// Default value functions
fn default_cpu() -> usize { pasa_lite_core::pool::DEFAULT_MAX_CONCURRENCY }
fn default_out_prefix() -> String { pasa_lite_core::pipeline::DEFAULT_OUT_PREFIX.to_string() }
fn default_min_per_id() -> f64 { ValidationOptions::default().min_per_id }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            out_prefix: default_out_prefix(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_per_id: default_min_per_id(),
            discard_unspliced: false,
            transcribed_is_aligned_orient: false,
            require_consensus_splice_sites: false,
        }
    }
}

impl ValidationConfig {
    pub fn to_options(&self) -> ValidationOptions {
        ValidationOptions {
            transcribed_is_aligned_orient: self.transcribed_is_aligned_orient,
            discard_unspliced: self.discard_unspliced,
            require_consensus_splice_sites: self.require_consensus_splice_sites,
            min_per_id: self.min_per_id,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.cpu, 2);
        assert_eq!(config.general.out_prefix, "pasa_lite");
        assert_eq!(config.validation.min_per_id, 95.0);
        assert!(!config.validation.require_consensus_splice_sites);
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.general.cpu = 6;
        config.validation.discard_unspliced = true;
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(toml::to_string_pretty(&config)?.as_bytes())?;

        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.general.cpu, 6);
        assert!(loaded.validation.discard_unspliced);
        assert_eq!(loaded.general.out_prefix, config.general.out_prefix);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "[validation]\nrequire_consensus_splice_sites = true")?;

        let config = Config::load(Some(temp_file.path()))?;
        assert!(config.validation.require_consensus_splice_sites);
        assert_eq!(config.validation.min_per_id, 95.0);
        assert_eq!(config.general.cpu, 2);
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_error() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "[general]\ncpu = \"many\"")?;
        assert!(Config::load_from_file(temp_file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_to_options() {
        let mut config = ValidationConfig::default();
        config.min_per_id = 90.0;
        config.transcribed_is_aligned_orient = true;
        let options = config.to_options();
        assert_eq!(options.min_per_id, 90.0);
        assert!(options.transcribed_is_aligned_orient);
        assert!(!options.discard_unspliced);
    }

    #[test]
    fn test_example_toml_generation() -> Result<()> {
        let example = Config::example_toml()?;
        assert!(example.contains("[general]"));
        assert!(example.contains("[validation]"));
        assert!(example.contains("min_per_id = 95.0"));
        Ok(())
    }
}
