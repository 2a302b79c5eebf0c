use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{NotesError, Result};

const DEFAULT_GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory holding notes and OAuth tokens
    pub data_dir: PathBuf,

    /// Address the HTTP server binds to
    pub bind_address: String,

    /// IANA time zone sent with calendar events when a request names none
    pub default_time_zone: String,

    /// Timeout applied to each calendar/OAuth request (in seconds)
    pub request_timeout_secs: u64,

    /// Half-width of the duplicate search window (in minutes)
    pub duplicate_window_minutes: i64,

    /// Maximum number of remote events inspected for a duplicate
    pub duplicate_max_candidates: usize,

    /// Popup reminder lead time for created events (in minutes)
    pub reminder_minutes: u32,

    /// Google OAuth and Calendar settings
    pub google: GoogleConfig,

    /// Active LLM backend settings
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: Config::default_data_dir(),
            bind_address: "127.0.0.1:3001".to_string(),
            default_time_zone: "UTC".to_string(),
            request_timeout_secs: 15,
            duplicate_window_minutes: 60,
            duplicate_max_candidates: 10,
            reminder_minutes: 15,
            google: GoogleConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Platform data directory, falling back to `./calnotes-data`
    pub fn default_data_dir() -> PathBuf {
        ProjectDirs::from("dev", "calnotes", "calnotes")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("calnotes-data"))
    }

    /// Location of the config file used when `--config` is not given
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "calnotes", "calnotes")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads configuration from `path` (or the default location when present)
    /// and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Config::default_config_path().filter(|p| p.exists()),
        };

        let mut config = match candidate {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                let raw = fs::read_to_string(&p).map_err(|e| NotesError::Configuration {
                    message: format!("cannot read {}: {}", p.display(), e),
                })?;
                serde_json::from_str::<Config>(&raw).map_err(|e| NotesError::Configuration {
                    message: format!("invalid config {}: {}", p.display(), e),
                })?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment-style overrides read through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = get("CALNOTES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(bind) = get("CALNOTES_BIND") {
            self.bind_address = bind;
        }
        if let Some(tz) = get("CALNOTES_TIME_ZONE") {
            self.default_time_zone = tz;
        }

        if let Some(id) = get("GOOGLE_CLIENT_ID") {
            self.google.client_id = id;
        }
        if let Some(secret) = get("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = secret;
        }
        if let Some(uri) = get("GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = uri;
        }

        if let Some(provider) = get("LLM_PROVIDER") {
            match provider.parse() {
                Ok(kind) => self.llm.provider = kind,
                Err(e) => log::warn!("Ignoring LLM_PROVIDER: {}", e),
            }
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        match self.llm.provider {
            LlmProviderKind::OpenAi => {
                if let Some(key) = get("OPENAI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
            LlmProviderKind::Gemini => {
                if let Some(key) = get("GEMINI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
            LlmProviderKind::Ollama => {
                if let Some(url) = get("OLLAMA_URL") {
                    self.llm.base_url = Some(url);
                }
            }
            LlmProviderKind::Disabled => {}
        }
    }

    /// Directory holding one JSON file per note
    pub fn notes_dir(&self) -> PathBuf {
        self.data_dir.join("notes")
    }

    /// JSON document holding OAuth token material
    pub fn tokens_path(&self) -> PathBuf {
        self.data_dir.join("tokens.json")
    }
}

/// Google OAuth client and Calendar API settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub calendar_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        GoogleConfig {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3001/auth/google/callback".to_string(),
            calendar_id: "primary".to_string(),
            auth_url: DEFAULT_GOOGLE_AUTH_URL.to_string(),
            token_url: DEFAULT_GOOGLE_TOKEN_URL.to_string(),
            api_base: DEFAULT_CALENDAR_API.to_string(),
        }
    }
}

impl GoogleConfig {
    /// Verifies that OAuth credentials are present
    pub fn check(&self) -> Result<()> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(NotesError::configuration(
                "Google client_id/client_secret are not set",
            ));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(NotesError::configuration("Google redirect_uri is not set"));
        }
        Ok(())
    }
}

/// Which generative backend serves the AI endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Ollama,
    #[default]
    Disabled,
}

impl FromStr for LlmProviderKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "gemini" => Ok(LlmProviderKind::Gemini),
            "ollama" => Ok(LlmProviderKind::Ollama),
            "disabled" | "none" | "off" => Ok(LlmProviderKind::Disabled),
            other => Err(format!("unknown LLM provider '{}'", other)),
        }
    }
}

/// LLM backend settings; exactly one backend is active per deployment.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    /// Model name; each provider has its own default
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: LlmProviderKind::Disabled,
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

impl LlmConfig {
    pub fn model_or(&self, default: &str) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_keep_duplicate_window_at_one_hour() {
        let config = Config::default();
        assert_eq!(config.duplicate_window_minutes, 60);
        assert_eq!(config.duplicate_max_candidates, 10);
        assert_eq!(config.reminder_minutes, 15);
        assert_eq!(config.llm.provider, LlmProviderKind::Disabled);
    }

    #[test]
    fn env_overrides_select_backend_and_key() {
        let vars = env(&[
            ("LLM_PROVIDER", "gemini"),
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_API_KEY", "o-key"),
            ("GOOGLE_CLIENT_ID", "cid"),
            ("CALNOTES_DATA_DIR", "/tmp/calnotes"),
        ]);
        let mut config = Config::default();
        config.apply_env_with(|k| vars.get(k).cloned());

        assert_eq!(config.llm.provider, LlmProviderKind::Gemini);
        assert_eq!(config.llm.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.google.client_id, "cid");
        assert_eq!(config.notes_dir(), PathBuf::from("/tmp/calnotes/notes"));
    }

    #[test]
    fn unknown_provider_is_ignored() {
        let vars = env(&[("LLM_PROVIDER", "clippy")]);
        let mut config = Config::default();
        config.apply_env_with(|k| vars.get(k).cloned());
        assert_eq!(config.llm.provider, LlmProviderKind::Disabled);
    }

    #[test]
    fn google_check_requires_credentials() {
        let mut google = GoogleConfig::default();
        assert!(matches!(
            google.check(),
            Err(NotesError::Configuration { .. })
        ));

        google.client_id = "id".to_string();
        google.client_secret = "secret".to_string();
        assert!(google.check().is_ok());
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"bind_address":"0.0.0.0:9000","llm":{"provider":"ollama"}}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.google.calendar_id, "primary");
    }
}
