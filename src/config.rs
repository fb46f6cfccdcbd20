use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::{DownloadPolicy, EngineKind};
use crate::error::{HonyakuError, Result};
use crate::language::LanguageTag;
use crate::shape::ListOrdering;

// Default values for optional configuration fields
fn default_timeout_secs() -> u64 {
    300
}

fn default_confidence_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub ollama: OllamaConfig,
    pub lexicon: LexiconConfig,
    pub detection: DetectionConfig,
    /// Download conditions used when a request does not set them
    pub download: DownloadPolicy,
    pub output: OutputConfig,
    pub sheet: SheetConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine implementation: ollama or lexicon
    #[serde(default)]
    pub kind: EngineKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model used for detection and translation
    pub model: String,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconConfig {
    /// Directory holding `<source>-<target>.json` dictionaries
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Language used when detection is undetermined or unsupported
    pub fallback_language: String,
    /// Detections below this confidence count as undetermined
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// List layout: arrival (completion order) or input (original order)
    #[serde(default)]
    pub list_ordering: ListOrdering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Target language for the interactive sheet
    pub target_language: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            directory: ".honyaku/lexicon".to_string(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            fallback_language: "en".to_string(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HonyakuError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| HonyakuError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HonyakuError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| HonyakuError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.fallback_language()?;
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(HonyakuError::Config(format!(
                "detection.confidence_threshold must be between 0 and 1, got {}",
                self.detection.confidence_threshold
            )));
        }
        Ok(())
    }

    pub fn fallback_language(&self) -> Result<LanguageTag> {
        LanguageTag::parse(&self.detection.fallback_language).ok_or_else(|| {
            HonyakuError::Config(format!(
                "Unsupported fallback language '{}'",
                self.detection.fallback_language
            ))
        })
    }
}
