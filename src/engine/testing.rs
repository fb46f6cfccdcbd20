//! Scriptable in-memory engine for orchestration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{DownloadPolicy, PairTranslator, TranslationEngine};
use crate::error::{HonyakuError, Result};
use crate::language::LanguagePair;

#[derive(Debug, Default)]
pub struct Calls {
    pub detect: AtomicUsize,
    pub opened: AtomicUsize,
    pub downloads: AtomicUsize,
    pub translate: AtomicUsize,
    pub translator_closes: AtomicUsize,
    pub detector_closes: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Total engine work, excluding release.
    pub fn work(&self) -> usize {
        Self::get(&self.detect) + Self::get(&self.downloads) + Self::get(&self.translate)
    }
}

#[derive(Default)]
struct Script {
    detections: HashMap<String, String>,
    delays: HashMap<String, u64>,
    fail_detect: HashSet<String>,
    fail_translate: HashSet<String>,
    fail_download: HashSet<String>,
}

/// Detects through a lookup table (default `"en"`) and translates to
/// `"<target>:<text>"`. Per-text delays shuffle completion order.
#[derive(Clone, Default)]
pub struct FakeEngine {
    script: Arc<Script>,
    pub calls: Arc<Calls>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::get_mut(&mut self.script).expect("script is configured before use")
    }

    pub fn detects(mut self, text: &str, language: &str) -> Self {
        self.script_mut().detections.insert(text.into(), language.into());
        self
    }

    pub fn delay(mut self, text: &str, millis: u64) -> Self {
        self.script_mut().delays.insert(text.into(), millis);
        self
    }

    pub fn fail_detect(mut self, text: &str) -> Self {
        self.script_mut().fail_detect.insert(text.into());
        self
    }

    pub fn fail_translate(mut self, text: &str) -> Self {
        self.script_mut().fail_translate.insert(text.into());
        self
    }

    /// Fail model preparation for pairs like `"en-de"`.
    pub fn fail_download(mut self, pair: &str) -> Self {
        self.script_mut().fail_download.insert(pair.into());
        self
    }

    async fn pause(&self, text: &str) {
        let millis = self.script.delays.get(text).copied().unwrap_or(0);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl TranslationEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn detect_language(&self, text: &str) -> Result<String> {
        self.calls.detect.fetch_add(1, Ordering::SeqCst);
        self.pause(text).await;
        if self.script.fail_detect.contains(text) {
            return Err(HonyakuError::DetectionFailed(format!(
                "Language identification failed for text: {}",
                text
            )));
        }
        Ok(self
            .script
            .detections
            .get(text)
            .cloned()
            .unwrap_or_else(|| "en".to_string()))
    }

    fn translator(&self, pair: LanguagePair) -> Result<Box<dyn PairTranslator>> {
        self.calls.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTranslator {
            engine: self.clone(),
            pair,
        }))
    }

    fn close_detector(&self) {
        self.calls.detector_closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeTranslator {
    engine: FakeEngine,
    pair: LanguagePair,
}

#[async_trait]
impl PairTranslator for FakeTranslator {
    async fn download_model_if_needed(&self, _policy: &DownloadPolicy) -> Result<()> {
        self.engine.calls.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.engine.script.fail_download.contains(&self.pair.to_string()) {
            return Err(HonyakuError::ModelDownloadFailed(format!(
                "Model download failed for {}",
                self.pair
            )));
        }
        Ok(())
    }

    async fn translate(&self, text: &str) -> Result<String> {
        self.engine.calls.translate.fetch_add(1, Ordering::SeqCst);
        self.engine.pause(text).await;
        if self.engine.script.fail_translate.contains(text) {
            return Err(HonyakuError::TranslateFailed(format!(
                "Translation failed for text: {}",
                text
            )));
        }
        Ok(format!("{}:{}", self.pair.target, text))
    }

    fn close(&self) {
        self.engine.calls.translator_closes.fetch_add(1, Ordering::SeqCst);
    }
}
