use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::Config;
use crate::engine::{EngineAdapter, EngineFactory, TranslationEngine};
use crate::error::{CodedError, HonyakuError, Result};
use crate::language::LanguageTag;
use crate::orchestrator::{FanOutOrchestrator, TaskOutcome};
use crate::request::TranslationRequest;
use crate::shape::TranslatedTexts;
use crate::sheet::{SheetRequest, SheetResult, SheetSurface};

/// Entry point for calling applications.
///
/// Each task gets a fresh [`EngineAdapter`], so translator handles never
/// outlive the request that opened them.
pub struct TranslateBridge {
    engine: Arc<dyn TranslationEngine>,
    config: Config,
    fallback: LanguageTag,
}

impl TranslateBridge {
    pub fn new(engine: Arc<dyn TranslationEngine>, config: Config) -> Result<Self> {
        let fallback = config.fallback_language()?;
        Ok(Self {
            engine,
            config,
            fallback,
        })
    }

    /// Build the engine named in the configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let engine = EngineFactory::create_engine(&config)?;
        Self::new(engine, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn translate_task(&self, request: TranslationRequest) -> Result<TaskOutcome> {
        // Validation happens before any engine handle exists
        let plan = request.into_plan(self.config.download)?;

        let adapter = Arc::new(EngineAdapter::new(Arc::clone(&self.engine)));
        let orchestrator =
            FanOutOrchestrator::new(adapter, self.fallback, self.config.output.list_ordering);
        orchestrator.run(plan).await
    }

    /// JSON in, JSON out; failures become `{ code, message }`.
    pub async fn translate_task_json(&self, params: Value) -> std::result::Result<Value, CodedError> {
        let request: TranslationRequest = serde_json::from_value(params).map_err(HonyakuError::from)?;
        let outcome = self.translate_task(request).await?;
        debug!(
            "Task used {}/{} steps",
            outcome.steps.completed, outcome.steps.planned
        );
        serde_json::to_value(&outcome.response).map_err(|e| HonyakuError::from(e).into())
    }

    /// Translate one string, then let `surface` show it to the user.
    pub async fn translate_sheet(
        &self,
        request: SheetRequest,
        surface: &dyn SheetSurface,
    ) -> Result<SheetResult> {
        if request.input.trim().is_empty() {
            return Err(HonyakuError::InvalidParameter(
                "No text provided for translation".to_string(),
            ));
        }
        if !surface.is_available() {
            return Err(HonyakuError::Unsupported(
                "Translation sheet needs an interactive terminal".to_string(),
            ));
        }

        info!("Opening translation sheet");
        let task = TranslationRequest::new(
            json!(request.input.clone()),
            &self.config.sheet.target_language,
        );
        let outcome = self.translate_task(task).await?;
        let proposal = match outcome.response.translated_texts {
            TranslatedTexts::Text(text) => text,
            other => {
                return Err(HonyakuError::InternalError(format!(
                    "Sheet translation returned {:?} instead of a single string",
                    other
                )));
            }
        };

        let translated_text = surface.present(&request.input, &proposal).await?;
        Ok(SheetResult { translated_text })
    }
}
