use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{DownloadPolicy, PairTranslator, TranslationEngine};
use crate::error::{HonyakuError, Result};
use crate::language::LanguagePair;

struct PairHandle {
    translator: Arc<dyn PairTranslator>,
    ready: OnceCell<()>,
}

#[derive(Default)]
struct Handles {
    pairs: HashMap<LanguagePair, Arc<PairHandle>>,
    released: bool,
}

/// Per-request view of an engine.
///
/// Translators are opened lazily, one per language pair, and stay cached until
/// [`EngineAdapter::release`] closes all of them together with the detector.
/// Model preparation runs at most once per pair no matter how many items ask.
pub struct EngineAdapter {
    engine: Arc<dyn TranslationEngine>,
    handles: Mutex<Handles>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn TranslationEngine>) -> Self {
        Self {
            engine,
            handles: Mutex::new(Handles::default()),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    fn lock(&self) -> MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, pair: LanguagePair) -> Result<Arc<PairHandle>> {
        let mut handles = self.lock();
        if handles.released {
            return Err(HonyakuError::InternalError(format!(
                "Translator for {} requested after release",
                pair
            )));
        }
        if let Some(handle) = handles.pairs.get(&pair) {
            return Ok(Arc::clone(handle));
        }

        debug!("Opening {} translator for {}", self.engine.name(), pair);
        let translator = self
            .engine
            .translator(pair)
            .map_err(|e| step_failure(e, HonyakuError::ModelDownloadFailed))?;
        let handle = Arc::new(PairHandle {
            translator: Arc::from(translator),
            ready: OnceCell::new(),
        });
        handles.pairs.insert(pair, Arc::clone(&handle));
        Ok(handle)
    }

    pub async fn detect_language(&self, text: &str) -> Result<String> {
        self.engine
            .detect_language(text)
            .await
            .map_err(|e| step_failure(e, HonyakuError::DetectionFailed))
    }

    /// Make sure the model for `pair` is usable. Concurrent callers for the
    /// same pair wait on the first download instead of starting their own.
    pub async fn ensure_model_ready(&self, pair: LanguagePair, policy: &DownloadPolicy) -> Result<()> {
        let handle = self.handle(pair)?;
        handle
            .ready
            .get_or_try_init(|| async {
                info!("Preparing model for {}", pair);
                handle.translator.download_model_if_needed(policy).await
            })
            .await
            .map(|_| ())
            .map_err(|e| step_failure(e, HonyakuError::ModelDownloadFailed))
    }

    pub async fn translate(&self, text: &str, pair: LanguagePair) -> Result<String> {
        let handle = self.handle(pair)?;
        handle
            .translator
            .translate(text)
            .await
            .map_err(|e| step_failure(e, HonyakuError::TranslateFailed))
    }

    /// Close every cached translator and the detector. Returns `false` when
    /// the adapter had already been released.
    pub fn release(&self) -> bool {
        let pairs = {
            let mut handles = self.lock();
            if handles.released {
                return false;
            }
            handles.released = true;
            std::mem::take(&mut handles.pairs)
        };

        debug!("Releasing {} translator(s) and detector", pairs.len());
        for handle in pairs.values() {
            handle.translator.close();
        }
        self.engine.close_detector();
        true
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

/// Keep failures that already carry a step kind, wrap anything else in `kind`.
fn step_failure(err: HonyakuError, kind: fn(String) -> HonyakuError) -> HonyakuError {
    match err {
        HonyakuError::DetectionFailed(_)
        | HonyakuError::ModelDownloadFailed(_)
        | HonyakuError::TranslateFailed(_)
        | HonyakuError::InternalError(_)
        | HonyakuError::Unsupported(_) => err,
        other => kind(other.to_string()),
    }
}
