// Pluggable translation engines
//
// The orchestrator only talks to engines through the traits below, wrapped in
// an `EngineAdapter` that caches one handle per language pair:
// - Ollama: local LLM over HTTP, model pulls stand in for model downloads
// - Lexicon: offline per-pair JSON dictionaries
//
// To add a new engine:
// 1. Implement `TranslationEngine` and a matching `PairTranslator`
// 2. Add the engine to `EngineKind`
// 3. Update `EngineFactory::create_engine`

pub mod adapter;
pub mod lexicon;
pub mod ollama;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use adapter::EngineAdapter;
use crate::config::Config;
use crate::error::Result;
use crate::language::LanguagePair;

/// Conditions a model download has to satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPolicy {
    /// Only download over an unmetered network
    #[serde(default)]
    pub requires_wifi: bool,
    /// Only download while the device is charging
    #[serde(default)]
    pub require_charging: bool,
}

impl DownloadPolicy {
    pub fn is_constrained(&self) -> bool {
        self.requires_wifi || self.require_charging
    }
}

/// Capability provider behind the adapter: language identification plus a
/// constructor for per-pair translators.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Identify the language of `text`. May answer `"und"`.
    async fn detect_language(&self, text: &str) -> Result<String>;

    /// Open a translator for one language pair. Must not do I/O.
    fn translator(&self, pair: LanguagePair) -> Result<Box<dyn PairTranslator>>;

    /// Release the language identifier.
    fn close_detector(&self);
}

/// Closeable translation capability for one language pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairTranslator: Send + Sync {
    /// Fetch or prepare the model for this pair. Cheap when already present.
    async fn download_model_if_needed(&self, policy: &DownloadPolicy) -> Result<()>;

    async fn translate(&self, text: &str) -> Result<String>;

    fn close(&self);
}

/// Engine implementation type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Ollama,
    Lexicon,
}

impl std::str::FromStr for EngineKind {
    type Err = crate::error::HonyakuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "lexicon" => Ok(Self::Lexicon),
            _ => Err(crate::error::HonyakuError::Config(format!(
                "Invalid engine '{}'. Valid engines: ollama, lexicon",
                s
            ))),
        }
    }
}

/// Factory for creating engine instances
pub struct EngineFactory;

impl EngineFactory {
    /// Create the engine selected by `config.engine.kind`
    pub fn create_engine(config: &Config) -> Result<Arc<dyn TranslationEngine>> {
        Self::create(config.engine.kind, config)
    }

    pub fn create(kind: EngineKind, config: &Config) -> Result<Arc<dyn TranslationEngine>> {
        match kind {
            EngineKind::Ollama => Ok(Arc::new(ollama::OllamaEngine::new(
                config.ollama.clone(),
                config.detection.confidence_threshold,
            )?)),
            EngineKind::Lexicon => Ok(Arc::new(lexicon::LexiconEngine::new(&config.lexicon.directory))),
        }
    }
}
