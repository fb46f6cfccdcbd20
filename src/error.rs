use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HonyakuError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    DetectionFailed(String),

    #[error("{0}")]
    ModelDownloadFailed(String),

    #[error("{0}")]
    TranslateFailed(String),

    #[error("{0}")]
    InternalError(String),

    #[error("{0}")]
    Unsupported(String),
}

impl HonyakuError {
    /// Machine-readable code surfaced to bridge callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::DetectionFailed(_) => "LANGUAGE_ID_FAILED",
            Self::ModelDownloadFailed(_) => "MODEL_DOWNLOAD_FAILED",
            Self::TranslateFailed(_) => "TEXT_TRANSLATE_FAILED",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::Json(_) => "PARAMETER_ERROR",
            Self::Io(_) | Self::Toml(_) | Self::Config(_) => "CONFIG_ERROR",
            Self::Http(_) => "ENGINE_ERROR",
        }
    }

    pub fn to_coded(&self) -> CodedError {
        CodedError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serialisable rejection handed back across the bridge boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedError {
    pub code: String,
    pub message: String,
}

impl From<HonyakuError> for CodedError {
    fn from(err: HonyakuError) -> Self {
        err.to_coded()
    }
}

pub type Result<T> = std::result::Result<T, HonyakuError>;
