//! Offline engine backed by per-pair JSON dictionaries.
//!
//! A "model" is the file `<dir>/<source>-<target>.json`, an object mapping
//! source phrases to translations. Whole-text matches win; otherwise words are
//! replaced one by one and unknown words pass through. Language identification
//! is by script, so Latin-script text comes back undetermined.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{DownloadPolicy, PairTranslator, TranslationEngine};
use crate::error::{HonyakuError, Result};
use crate::language::{LanguagePair, UNDETERMINED};

pub struct LexiconEngine {
    directory: PathBuf,
}

impl LexiconEngine {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn lexicon_path(&self, pair: &LanguagePair) -> PathBuf {
        self.directory.join(format!("{}.json", pair))
    }

    /// Pairs with a dictionary file present, sorted.
    pub async fn available_pairs(&self) -> Result<Vec<String>> {
        let mut pairs = Vec::new();
        let mut entries = fs::read_dir(&self.directory).await.map_err(|e| {
            HonyakuError::Config(format!(
                "Cannot read lexicon directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    pairs.push(stem.to_string_lossy().to_string());
                }
            }
        }
        pairs.sort();
        Ok(pairs)
    }
}

#[async_trait]
impl TranslationEngine for LexiconEngine {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    async fn detect_language(&self, text: &str) -> Result<String> {
        Ok(detect_script(text).to_string())
    }

    fn translator(&self, pair: LanguagePair) -> Result<Box<dyn PairTranslator>> {
        Ok(Box::new(LexiconTranslator {
            path: self.lexicon_path(&pair),
            pair,
            entries: OnceCell::new(),
        }))
    }

    fn close_detector(&self) {
        debug!("Lexicon detector closed");
    }
}

pub struct LexiconTranslator {
    path: PathBuf,
    pair: LanguagePair,
    entries: OnceCell<HashMap<String, String>>,
}

impl LexiconTranslator {
    fn is_identity(&self) -> bool {
        self.pair.source == self.pair.target
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            HonyakuError::ModelDownloadFailed(format!(
                "No lexicon for {} at {}: {}",
                self.pair,
                self.path.display(),
                e
            ))
        })?;
        let raw: HashMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            HonyakuError::ModelDownloadFailed(format!(
                "Malformed lexicon {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!("Loaded {} lexicon entries for {}", raw.len(), self.pair);
        Ok(raw
            .into_iter()
            .map(|(source, target)| (normalize(&source), target))
            .collect())
    }
}

#[async_trait]
impl PairTranslator for LexiconTranslator {
    async fn download_model_if_needed(&self, _policy: &DownloadPolicy) -> Result<()> {
        if self.is_identity() {
            return Ok(());
        }
        self.entries.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    async fn translate(&self, text: &str) -> Result<String> {
        if self.is_identity() {
            return Ok(text.to_string());
        }
        let entries = self.entries.get().ok_or_else(|| {
            HonyakuError::TranslateFailed(format!("Lexicon for {} is not loaded", self.pair))
        })?;
        Ok(lookup(entries, text))
    }

    fn close(&self) {
        debug!("Lexicon translator for {} closed", self.pair);
    }
}

fn normalize(phrase: &str) -> String {
    phrase.trim().to_lowercase()
}

fn lookup(entries: &HashMap<String, String>, text: &str) -> String {
    if let Some(hit) = entries.get(&normalize(text)) {
        return hit.clone();
    }

    text.split_whitespace()
        .map(|word| {
            let core = word.trim_end_matches(|c: char| c.is_ascii_punctuation());
            let tail = &word[core.len()..];
            match entries.get(&normalize(core)) {
                Some(hit) => format!("{}{}", hit, tail),
                None => word.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Guess a language from the dominant non-Latin script.
pub fn detect_script(text: &str) -> &'static str {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let mut kana = false;

    for c in text.chars() {
        let language = match c as u32 {
            0x3040..=0x30FF => {
                kana = true;
                "ja"
            }
            0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => "ko",
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => "zh",
            0x0400..=0x04FF => "ru",
            0x0600..=0x06FF => "ar",
            0x0370..=0x03FF => "el",
            0x0590..=0x05FF => "he",
            0x0E00..=0x0E7F => "th",
            0x0900..=0x097F => "hi",
            0x0980..=0x09FF => "bn",
            0x0A80..=0x0AFF => "gu",
            0x0B80..=0x0BFF => "ta",
            0x0C00..=0x0C7F => "te",
            0x0C80..=0x0CFF => "kn",
            0x10A0..=0x10FF => "ka",
            _ => continue,
        };
        *counts.entry(language).or_default() += 1;
    }

    // Japanese mixes kanji with kana
    if kana {
        return "ja";
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(language, _)| language)
        .unwrap_or(UNDETERMINED)
}
