//! Generative text backends.
//!
//! One [`LlmBackend`] trait with an implementation per provider. Exactly one
//! backend is active per deployment, chosen by [`LlmConfig::provider`]; the
//! backends never fall back to each other.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{LlmConfig, LlmProviderKind, NotesError, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Typed failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM backend is not configured")]
    NotConfigured,
    #[error("LLM backend unavailable: {0}")]
    Unavailable(String),
    #[error("LLM backend rejected the credentials")]
    Unauthorized,
    #[error("model '{0}' is not installed")]
    ModelNotInstalled(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
    #[error("LLM request timed out")]
    Timeout,
}

/// Provider-agnostic text generation.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider name for logging and status output
    fn name(&self) -> &str;

    /// Checks that the backend can serve requests.
    ///
    /// Backends that need a locally installed model report
    /// [`LlmError::ModelNotInstalled`] here; nothing is installed on the
    /// caller's behalf.
    async fn initialize(&self) -> std::result::Result<(), LlmError>;

    /// Generates a completion for `prompt` under `system_prompt`
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> std::result::Result<String, LlmError>;
}

/// Builds the configured backend, or `None` when LLM support is disabled.
///
/// Missing credentials are a configuration error so the caller can disable
/// the feature at start-up.
pub fn build_backend(config: &LlmConfig) -> Result<Option<Arc<dyn LlmBackend>>> {
    let backend: Arc<dyn LlmBackend> = match config.provider {
        LlmProviderKind::Disabled => {
            debug!("LLM support disabled by configuration");
            return Ok(None);
        }
        LlmProviderKind::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        LlmProviderKind::Gemini => Arc::new(GeminiBackend::new(config)?),
        LlmProviderKind::Ollama => Arc::new(OllamaBackend::new(config)?),
    };
    info!("Using LLM backend: {}", backend.name());
    Ok(Some(backend))
}

fn http_client(config: &LlmConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| NotesError::configuration(format!("LLM HTTP client: {}", e)))
}

fn required_key(config: &LlmConfig, provider: &str) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| NotesError::configuration(format!("{} API key is not set", provider)))
}

fn send_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Unavailable(err.to_string())
    }
}

async fn check_status(resp: Response) -> std::result::Result<Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(LlmError::Unauthorized);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Unavailable(format!(
        "HTTP {}: {}",
        status,
        crate::truncate_chars(body.trim(), 200)
    )))
}

fn non_empty(text: Option<String>) -> std::result::Result<String, LlmError> {
    text.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(LlmError::EmptyResponse)
}

// OpenAI-compatible chat completions

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI (or any OpenAI-compatible) `/chat/completions` endpoint.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(OpenAiBackend {
            client: http_client(config)?,
            base_url: config.base_url_or(DEFAULT_OPENAI_BASE_URL),
            api_key: required_key(config, "OpenAI")?,
            model: config.model_or(DEFAULT_OPENAI_MODEL),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn initialize(&self) -> std::result::Result<(), LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> std::result::Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("POST {}/chat/completions model={}", self.base_url, self.model);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        let body: ChatCompletionResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        non_empty(body.choices.into_iter().next().and_then(|c| c.message.content))
    }
}

// Gemini generateContent

#[derive(Serialize, Deserialize, Default)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

/// Google Gemini `models/{model}:generateContent`.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(GeminiBackend {
            client: http_client(config)?,
            base_url: config.base_url_or(DEFAULT_GEMINI_BASE_URL),
            api_key: required_key(config, "Gemini")?,
            model: config.model_or(DEFAULT_GEMINI_MODEL),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn initialize(&self) -> std::result::Result<(), LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> std::result::Result<String, LlmError> {
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_prompt.to_string(),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug!("POST {}", url);
        let resp = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        let body: GeminiResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let text = body.candidates.into_iter().next().map(|c| {
            c.content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        });
        non_empty(text)
    }
}

// Ollama /api/chat

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelEntry>,
}

#[derive(Deserialize)]
struct OllamaModelEntry {
    name: String,
}

/// Local Ollama server. The configured model must already be pulled.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    ready: AtomicBool,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(OllamaBackend {
            client: http_client(config)?,
            base_url: config.base_url_or(DEFAULT_OLLAMA_BASE_URL),
            model: config.model_or(DEFAULT_OLLAMA_MODEL),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            ready: AtomicBool::new(false),
        })
    }

    fn model_matches(&self, installed: &str) -> bool {
        if installed == self.model {
            return true;
        }
        // an untagged model name refers to ":latest"
        !self.model.contains(':') && installed == format!("{}:latest", self.model)
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn initialize(&self) -> std::result::Result<(), LlmError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(send_error)?;

        let tags: OllamaTagsResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if !tags.models.iter().any(|m| self.model_matches(&m.name)) {
            warn!(
                "Ollama model '{}' is not installed; run `ollama pull {}`",
                self.model, self.model
            );
            return Err(LlmError::ModelNotInstalled(self.model.clone()));
        }

        self.ready.store(true, Ordering::Release);
        debug!("Ollama model '{}' is available", self.model);
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> std::result::Result<String, LlmError> {
        if !self.ready.load(Ordering::Acquire) {
            self.initialize().await?;
        }

        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        let body: OllamaChatResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        non_empty(body.message.map(|m| m.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProviderKind, key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_provider_builds_nothing() {
        assert!(build_backend(&config(LlmProviderKind::Disabled, None))
            .unwrap()
            .is_none());
    }

    #[test]
    fn hosted_backends_require_a_key() {
        for kind in [LlmProviderKind::OpenAi, LlmProviderKind::Gemini] {
            let result = build_backend(&config(kind, Some("  ")));
            assert!(matches!(result, Err(NotesError::Configuration { .. })));
        }
        let backend = build_backend(&config(LlmProviderKind::OpenAi, Some("sk")))
            .unwrap()
            .unwrap();
        assert_eq!(backend.name(), "openai");
    }

    #[test]
    fn ollama_needs_no_key_and_matches_latest_tag() {
        let backend = OllamaBackend::new(&config(LlmProviderKind::Ollama, None)).unwrap();
        assert!(backend.model_matches("llama3.2"));
        assert!(backend.model_matches("llama3.2:latest"));
        assert!(!backend.model_matches("llama3.2:70b"));
        assert!(!backend.model_matches("mistral:latest"));
    }

    #[test]
    fn empty_output_is_an_error() {
        assert_eq!(non_empty(Some("  \n".to_string())), Err(LlmError::EmptyResponse));
        assert_eq!(non_empty(None), Err(LlmError::EmptyResponse));
        assert_eq!(non_empty(Some(" hi ".to_string())).unwrap(), "hi");
    }
}
