use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::language::{LanguageTag, SourceLanguage, UNDETERMINED};
use crate::shape::{ListOrdering, OutputAccumulator, TranslatedTexts};

/// `sourceLanguage` value when auto-detected items disagree.
pub const MIXED_LANGUAGES: &str = "multiple";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    pub translated_texts: TranslatedTexts,
    pub detected_languages: BTreeMap<String, String>,
    pub source_language: String,
    pub target_language: String,
}

/// Single source language for the whole request.
///
/// A fixed source is echoed. Otherwise one distinct detection is returned as
/// is, several collapse to [`MIXED_LANGUAGES`], and none (empty input) to
/// `"und"`.
pub fn summarize_source(source: &SourceLanguage, detected: &BTreeMap<String, LanguageTag>) -> String {
    if let SourceLanguage::Fixed(tag) = source {
        return tag.to_string();
    }

    let distinct: BTreeSet<&LanguageTag> = detected.values().collect();
    match distinct.len() {
        0 => UNDETERMINED.to_string(),
        1 => distinct
            .into_iter()
            .next()
            .map(|tag| tag.to_string())
            .unwrap_or_else(|| UNDETERMINED.to_string()),
        _ => MIXED_LANGUAGES.to_string(),
    }
}

pub fn assemble(
    output: OutputAccumulator,
    detected: BTreeMap<String, LanguageTag>,
    source: &SourceLanguage,
    target_code: &str,
    ordering: ListOrdering,
) -> TranslationResponse {
    let source_language = summarize_source(source, &detected);
    TranslationResponse {
        translated_texts: output.into_texts(ordering),
        detected_languages: detected
            .into_iter()
            .map(|(key, tag)| (key, tag.to_string()))
            .collect(),
        source_language,
        target_language: target_code.to_string(),
    }
}
