use std::fmt;

use isolang::Language;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::{HonyakuError, Result};

/// Sentinel callers send instead of a source code to request detection.
pub const AUTO_DETECT: &str = "auto";

/// Tag language identifiers return when they cannot decide.
pub const UNDETERMINED: &str = "und";

/// Languages the engines accept, as ISO 639-1 codes.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "af", "ar", "be", "bg", "bn", "ca", "cs", "cy", "da", "de", "el", "en", "eo", "es", "et",
    "fa", "fi", "fr", "ga", "gl", "gu", "he", "hi", "hr", "ht", "hu", "id", "is", "it", "ja",
    "ka", "kn", "ko", "lt", "lv", "mk", "mr", "ms", "mt", "nl", "no", "pl", "pt", "ro", "ru",
    "sk", "sl", "sq", "sv", "sw", "ta", "te", "th", "tl", "tr", "uk", "ur", "vi", "zh",
];

/// A supported language, always held in its canonical two-letter form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguageTag(&'static str);

impl LanguageTag {
    /// Resolve a BCP-47 style tag (`de`, `de-AT`, `pt_BR`), an ISO 639-3 code
    /// or a legacy alias to a supported language.
    pub fn parse(tag: &str) -> Option<Self> {
        let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        let primary = match primary.as_str() {
            "iw" => "he",
            "in" => "id",
            "nb" | "nn" => "no",
            "fil" => "tl",
            other => other,
        };

        let language = match primary.len() {
            2 => Language::from_639_1(primary),
            3 => Language::from_639_3(primary),
            _ => None,
        }?;
        let code = language.to_639_1()?;

        SUPPORTED_LANGUAGES
            .iter()
            .find(|supported| **supported == code)
            .map(|supported| LanguageTag(supported))
    }

    pub fn code(&self) -> &'static str {
        self.0
    }

    /// English display name, falling back to the code.
    pub fn name(&self) -> &'static str {
        Language::from_639_1(self.0)
            .map(|language| language.to_name())
            .unwrap_or(self.0)
    }

    pub fn supported() -> impl Iterator<Item = LanguageTag> {
        SUPPORTED_LANGUAGES.iter().map(|code| LanguageTag(code))
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for LanguageTag {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0)
    }
}

/// Cache key for per-pair engine handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguagePair {
    pub source: LanguageTag,
    pub target: LanguageTag,
}

impl LanguagePair {
    pub fn new(source: LanguageTag, target: LanguageTag) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

/// Where the source language of a request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    /// Every item is translated from this language; no detection runs.
    Fixed(LanguageTag),
    /// Each item is detected on its own.
    Auto,
}

impl SourceLanguage {
    /// Absent or `"auto"` means detection; anything else must be supported.
    pub fn resolve(code: Option<&str>) -> Result<Self> {
        match code {
            None => Ok(Self::Auto),
            Some(code) if code.trim().eq_ignore_ascii_case(AUTO_DETECT) => Ok(Self::Auto),
            Some(code) => LanguageTag::parse(code)
                .map(Self::Fixed)
                .ok_or_else(|| {
                    HonyakuError::InvalidParameter(format!("Invalid source language: {}", code))
                }),
        }
    }

    pub fn fixed(&self) -> Option<LanguageTag> {
        match self {
            Self::Fixed(tag) => Some(*tag),
            Self::Auto => None,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

pub fn resolve_target(code: Option<&str>) -> Result<LanguageTag> {
    let code = code.ok_or_else(|| {
        HonyakuError::InvalidParameter("Target language code is missing".to_string())
    })?;
    LanguageTag::parse(code)
        .ok_or_else(|| HonyakuError::InvalidParameter(format!("Invalid target language: {}", code)))
}

/// Map an identifier's raw answer onto a supported tag. Undetermined or
/// unsupported answers become `fallback` rather than failing the request.
pub fn normalize_detected(raw: &str, fallback: LanguageTag) -> LanguageTag {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(UNDETERMINED) {
        debug!("Language undetermined, using fallback {}", fallback);
        return fallback;
    }
    LanguageTag::parse(raw).unwrap_or_else(|| {
        debug!("Detected language '{}' is not supported, using fallback {}", raw, fallback);
        fallback
    })
}
