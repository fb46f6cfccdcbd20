use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{DownloadPolicy, PairTranslator, TranslationEngine};
use crate::config::OllamaConfig;
use crate::error::{HonyakuError, Result};
use crate::language::{LanguagePair, UNDETERMINED};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub language: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub status: String,
}

/// Shared HTTP plumbing for the detector and every pair translator.
#[derive(Clone)]
struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Run a non-streaming JSON generation and return the raw model answer.
    async fn generate(&self, prompt: String) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt,
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!("Sending generate request to: {}", url);

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(HonyakuError::Config(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await?;
        let raw_response = generated.response.trim().to_string();
        debug!("Raw Ollama response: {}", raw_response);
        Ok(raw_response)
    }

    async fn model_present(&self) -> Result<bool> {
        let url = format!("{}/api/show", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.config.model }))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn pull_model(&self) -> Result<()> {
        let url = format!("{}/api/pull", self.config.endpoint);
        info!("Pulling Ollama model '{}'", self.config.model);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.config.model, "stream": false }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(HonyakuError::ModelDownloadFailed(format!(
                "Pulling model '{}' failed with {}: {}",
                self.config.model, status, error_text
            )));
        }

        let pulled: PullResponse = response.json().await?;
        if pulled.status != "success" {
            return Err(HonyakuError::ModelDownloadFailed(format!(
                "Pulling model '{}' ended with status '{}'",
                self.config.model, pulled.status
            )));
        }
        Ok(())
    }
}

/// Local LLM engine served by Ollama.
pub struct OllamaEngine {
    inner: OllamaClient,
    confidence_threshold: f64,
}

impl OllamaEngine {
    pub fn new(config: OllamaConfig, confidence_threshold: f64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            inner: OllamaClient { client, config },
            confidence_threshold,
        })
    }

    /// Check that Ollama answers and the configured model is present.
    pub async fn check_availability(&self) -> Result<()> {
        let present = self.inner.model_present().await.map_err(|e| {
            HonyakuError::Config(format!("Failed to connect to Ollama: {}", e))
        })?;
        if present {
            info!("Ollama model '{}' is available", self.inner.config.model);
            Ok(())
        } else {
            Err(HonyakuError::Config(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                self.inner.config.model, self.inner.config.model
            )))
        }
    }
}

#[async_trait]
impl TranslationEngine for OllamaEngine {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn detect_language(&self, text: &str) -> Result<String> {
        let raw_response = self
            .inner
            .generate(build_detection_prompt(text))
            .await
            .map_err(|e| {
                HonyakuError::DetectionFailed(format!("Language identification failed: {}", e))
            })?;
        Ok(parse_detection(&raw_response, self.confidence_threshold))
    }

    fn translator(&self, pair: LanguagePair) -> Result<Box<dyn PairTranslator>> {
        Ok(Box::new(OllamaTranslator {
            inner: self.inner.clone(),
            pair,
        }))
    }

    fn close_detector(&self) {
        debug!("Ollama detector closed");
    }
}

pub struct OllamaTranslator {
    inner: OllamaClient,
    pair: LanguagePair,
}

#[async_trait]
impl PairTranslator for OllamaTranslator {
    async fn download_model_if_needed(&self, policy: &DownloadPolicy) -> Result<()> {
        if policy.is_constrained() {
            // Network type and charge state are not visible from here
            debug!("Download conditions {:?} are not enforced by Ollama", policy);
        }

        let present = self.inner.model_present().await.map_err(|e| {
            HonyakuError::ModelDownloadFailed(format!(
                "Model download failed for {}: {}",
                self.pair, e
            ))
        })?;
        if present {
            debug!("Model '{}' already present for {}", self.inner.config.model, self.pair);
            return Ok(());
        }

        self.inner.pull_model().await.map_err(|e| match e {
            HonyakuError::ModelDownloadFailed(_) => e,
            other => HonyakuError::ModelDownloadFailed(format!(
                "Model download failed for {}: {}",
                self.pair, other
            )),
        })
    }

    async fn translate(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let raw_response = self
            .inner
            .generate(build_translation_prompt(text, &self.pair))
            .await
            .map_err(|e| HonyakuError::TranslateFailed(format!("Translation failed for text: {}: {}", text, e)))?;

        if raw_response.is_empty() {
            return Err(HonyakuError::TranslateFailed(
                "Empty translation received".to_string(),
            ));
        }

        if let Ok(result) = serde_json::from_str::<TranslationResult>(&raw_response) {
            return Ok(result.text.trim().to_string());
        }

        warn!("Translation response was not the requested JSON, cleaning it up");
        Ok(clean_translation_response(&raw_response))
    }

    fn close(&self) {
        debug!("Ollama translator for {} closed", self.pair);
    }
}

fn build_detection_prompt(text: &str) -> String {
    format!(
        "You are a language identification system.\n\
         \n\
         Identify the language of the text below.\n\
         Return ONLY JSON in the form {{\"language\":\"<ISO 639-1 code>\",\"confidence\":<0.0-1.0>}}.\n\
         Use \"{}\" as the code when the language cannot be determined.\n\
         \n\
         [Text]\n\
         {}\n",
        UNDETERMINED, text
    )
}

/// Read the detector's answer. Low confidence or an unreadable answer is
/// reported as undetermined.
fn parse_detection(raw_response: &str, confidence_threshold: f64) -> String {
    match serde_json::from_str::<DetectionResult>(raw_response) {
        Ok(result) => match result.confidence {
            Some(confidence) if confidence < confidence_threshold => {
                debug!(
                    "Detected '{}' below confidence threshold ({:.2} < {:.2})",
                    result.language, confidence, confidence_threshold
                );
                UNDETERMINED.to_string()
            }
            _ => result.language.trim().to_string(),
        },
        Err(e) => {
            warn!("Unreadable detection response '{}': {}", raw_response, e);
            UNDETERMINED.to_string()
        }
    }
}

fn build_translation_prompt(text: &str, pair: &LanguagePair) -> String {
    let source_name = pair.source.name();
    let target_name = pair.target.name();

    format!(
        "You are a professional translator.\n\
         \n\
         CRITICAL: You must translate the text from {} to {} ONLY. Do not translate to any other language.\n\
         The target language is: {} (language code: {})\n\
         \n\
         Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
         Do not include any explanations, alternatives, or text in other languages.\n\
         \n\
         [Text to translate]\n\
         {}\n",
        source_name, target_name, target_name, pair.target, target_name, text
    )
}

/// Pull the translation out of a chatty answer.
fn clean_translation_response(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();

    for &line in &lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("Here are")
            || trimmed.starts_with("Here is")
            || trimmed.starts_with("Option")
            || trimmed.starts_with("**Option")
            || trimmed.starts_with("Translation:")
            || trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
        {
            continue;
        }

        if trimmed.starts_with("**") && trimmed.ends_with("**") {
            continue;
        }

        if trimmed.len() > 3 {
            return trimmed.to_string();
        }
    }

    lines
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .unwrap_or(response)
        .to_string()
}
