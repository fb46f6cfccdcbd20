use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::DownloadPolicy;
use crate::error::Result;
use crate::language::{self, LanguageTag, SourceLanguage};
use crate::shape::{self, Shape, WorkItem};

/// Task parameters as sent by the calling application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub target_lang_code: Option<String>,
    #[serde(default)]
    pub source_lang_code: Option<String>,
    #[serde(default)]
    pub requires_wifi: Option<bool>,
    #[serde(default)]
    pub require_charging: Option<bool>,
}

impl TranslationRequest {
    pub fn new(input: Value, target_lang_code: &str) -> Self {
        Self {
            input,
            target_lang_code: Some(target_lang_code.to_string()),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source_lang_code: &str) -> Self {
        self.source_lang_code = Some(source_lang_code.to_string());
        self
    }

    /// Validate everything that can be checked without touching an engine:
    /// input, then target, then source. Missing download flags take
    /// `defaults`.
    pub fn into_plan(self, defaults: DownloadPolicy) -> Result<TranslationPlan> {
        let shape = Shape::from_value(self.input)?;
        let target = language::resolve_target(self.target_lang_code.as_deref())?;
        let source = SourceLanguage::resolve(self.source_lang_code.as_deref())?;
        let policy = DownloadPolicy {
            requires_wifi: self.requires_wifi.unwrap_or(defaults.requires_wifi),
            require_charging: self.require_charging.unwrap_or(defaults.require_charging),
        };
        let items = shape::flatten(&shape);

        Ok(TranslationPlan {
            shape,
            items,
            target,
            target_code: self.target_lang_code.unwrap_or_default(),
            source,
            policy,
        })
    }
}

/// A validated request, ready for the orchestrator.
#[derive(Debug, Clone)]
pub struct TranslationPlan {
    pub shape: Shape,
    pub items: Vec<WorkItem>,
    pub target: LanguageTag,
    /// Target code exactly as the caller sent it, echoed in the response.
    pub target_code: String,
    pub source: SourceLanguage,
    pub policy: DownloadPolicy,
}
