//! Prompt templates, output clean-up and the LLM-or-fallback pipeline behind
//! the AI endpoints.

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::{
    fallback_categories, fallback_enhancement, fallback_quote, fallback_suggestion,
    fallback_summary, LlmBackend, LlmError,
};

const CATEGORIES: [&str; 7] = [
    "Work", "Personal", "Todo", "Idea", "Shopping", "Finance", "General",
];

/// The text-generation capabilities offered on notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Suggest,
    Enhance,
    Categorize,
    Summarize,
    Quote,
}

impl Capability {
    fn system_prompt(self) -> &'static str {
        match self {
            Capability::Suggest => {
                "You are a helpful assistant for a note-taking app. Give one short, \
                 practical suggestion for what the user could do with their note. \
                 Reply in plain text with a single sentence."
            }
            Capability::Enhance => {
                "You improve notes. Rewrite the note so it is clearer and more complete \
                 without inventing facts. Reply in plain text without markdown."
            }
            Capability::Categorize => {
                "You classify notes. Reply with exactly one word from this list: \
                 Work, Personal, Todo, Idea, Shopping, Finance, General."
            }
            Capability::Summarize => {
                "You summarize notes. Reply with one plain sentence of at most 25 words."
            }
            Capability::Quote => {
                "You write short original quotes. Reply with the quote only, no author \
                 and no quotation marks."
            }
        }
    }

    fn prompt(self, input: &str) -> String {
        match self {
            Capability::Suggest => format!("Note:\n{}\n\nSuggestion:", input),
            Capability::Enhance => format!("Enhance this note:\n{}", input),
            Capability::Categorize => format!("Categorize this note:\n{}", input),
            Capability::Summarize => format!("Summarize this note:\n{}", input),
            Capability::Quote => format!("Write a quote for someone who feels {}.", input),
        }
    }
}

/// Which engine produced a piece of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistOutput {
    pub text: String,
    pub source: OutputSource,
}

impl AssistOutput {
    fn fallback(text: String) -> Self {
        AssistOutput {
            text,
            source: OutputSource::Fallback,
        }
    }
}

/// Removes markdown emphasis, heading and code markers plus surrounding
/// quote characters from model output.
pub fn sanitize_output(raw: &str) -> String {
    let lines: Vec<String> = raw
        .lines()
        .map(|line| {
            let line = line.trim_start();
            let line = line.trim_start_matches('#').trim_start();
            line.replace("**", "")
                .replace("__", "")
                .replace(['*', '`'], "")
                .trim_end()
                .to_string()
        })
        .collect();

    let joined = lines.join("\n");
    let trimmed = joined.trim();
    trimmed
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'))
        .trim()
        .to_string()
}

/// Runs capabilities against the configured backend and substitutes the
/// rule-based output whenever the backend is absent or fails.
#[derive(Clone, Default)]
pub struct Assistant {
    backend: Option<Arc<dyn LlmBackend>>,
}

impl Assistant {
    pub fn new(backend: Option<Arc<dyn LlmBackend>>) -> Self {
        Assistant { backend }
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Presence/configuration check of the active backend
    pub async fn initialize(&self) -> Result<(), LlmError> {
        match &self.backend {
            Some(backend) => backend.initialize().await,
            None => Err(LlmError::NotConfigured),
        }
    }

    pub async fn suggest(&self, content: &str) -> AssistOutput {
        self.run(Capability::Suggest, content, fallback_suggestion)
            .await
    }

    pub async fn enhance(&self, content: &str) -> AssistOutput {
        self.run(Capability::Enhance, content, fallback_enhancement)
            .await
    }

    /// Category label; LLM answers outside the known set fall back to the
    /// keyword rules.
    pub async fn categorize(&self, content: &str) -> AssistOutput {
        let out = self
            .run(Capability::Categorize, content, fallback_categories)
            .await;
        if out.source == OutputSource::Fallback {
            return out;
        }

        let answer = out.text.trim_end_matches('.').trim().to_lowercase();
        match CATEGORIES.iter().find(|c| c.to_lowercase() == answer) {
            Some(category) => AssistOutput {
                text: category.to_string(),
                source: OutputSource::Llm,
            },
            None => {
                debug!("LLM category '{}' not recognised, using rules", out.text);
                AssistOutput::fallback(fallback_categories(content))
            }
        }
    }

    pub async fn summarize(&self, content: &str) -> AssistOutput {
        self.run(Capability::Summarize, content, fallback_summary)
            .await
    }

    pub async fn quote(&self, mood: Option<&str>) -> AssistOutput {
        let mood_text = mood
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("curious");
        self.run(Capability::Quote, mood_text, |_| fallback_quote(mood))
            .await
    }

    async fn run<F>(&self, capability: Capability, input: &str, fallback: F) -> AssistOutput
    where
        F: Fn(&str) -> String,
    {
        let Some(backend) = &self.backend else {
            return AssistOutput::fallback(fallback(input));
        };

        match backend
            .generate(&capability.prompt(input), capability.system_prompt())
            .await
        {
            Ok(raw) => {
                let text = sanitize_output(&raw);
                if text.is_empty() {
                    warn!("{} returned only markup for {:?}", backend.name(), capability);
                    return AssistOutput::fallback(fallback(input));
                }
                AssistOutput {
                    text,
                    source: OutputSource::Llm,
                }
            }
            Err(e) => {
                warn!(
                    "{} failed for {:?}, using fallback: {}",
                    backend.name(),
                    capability,
                    e
                );
                AssistOutput::fallback(fallback(input))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct ScriptedBackend {
        reply: std::result::Result<String, LlmError>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        fn new(reply: std::result::Result<&str, LlmError>) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn initialize(&self) -> std::result::Result<(), LlmError> {
            Ok(())
        }

        async fn generate(
            &self,
            prompt: &str,
            system_prompt: &str,
        ) -> std::result::Result<String, LlmError> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), system_prompt.to_string()));
            self.reply.clone()
        }
    }

    #[test]
    fn sanitize_strips_markdown_and_quotes() {
        assert_eq!(sanitize_output("\"**Plan** the `trip`\""), "Plan the trip");
        assert_eq!(sanitize_output("## Heading\n__bold__ text"), "Heading\nbold text");
        assert_eq!(sanitize_output("“Stay curious.”"), "Stay curious.");
        assert_eq!(sanitize_output("snake_case_name"), "snake_case_name");
    }

    #[tokio::test]
    async fn no_backend_uses_fallback() {
        let assistant = Assistant::default();
        let out = assistant.categorize("Buy milk and eggs").await;
        assert_eq!(out.text, "Shopping");
        assert_eq!(out.source, OutputSource::Fallback);
        assert_eq!(assistant.initialize().await, Err(LlmError::NotConfigured));
    }

    #[tokio::test]
    async fn backend_failure_falls_back() {
        let assistant = Assistant::new(Some(ScriptedBackend::new(Err(LlmError::Timeout))));
        let out = assistant.suggest("abcde").await;
        assert_eq!(out.text, fallback_suggestion("abcde"));
        assert_eq!(out.source, OutputSource::Fallback);
    }

    #[tokio::test]
    async fn backend_output_is_sanitised_and_prompted_with_content() {
        let backend = ScriptedBackend::new(Ok("**Call the client first.**"));
        let assistant = Assistant::new(Some(backend.clone()));

        let out = assistant.suggest("client call").await;
        assert_eq!(out.text, "Call the client first.");
        assert_eq!(out.source, OutputSource::Llm);

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("client call"));
        assert_eq!(prompts[0].1, Capability::Suggest.system_prompt());
    }

    #[tokio::test]
    async fn unknown_llm_category_uses_rules() {
        let assistant = Assistant::new(Some(ScriptedBackend::new(Ok("Groceries"))));
        let out = assistant.categorize("Buy bread").await;
        assert_eq!(out.text, "Shopping");
        assert_eq!(out.source, OutputSource::Fallback);

        let assistant = Assistant::new(Some(ScriptedBackend::new(Ok("work."))));
        assert_eq!(assistant.categorize("anything").await.text, "Work");
    }
}
