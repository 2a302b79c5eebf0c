//! LLM backend wire tests against a wiremock server.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calnotes::{
    fallback_categories, Assistant, GeminiBackend, LlmBackend, LlmConfig, LlmError,
    LlmProviderKind, OllamaBackend, OpenAiBackend, OutputSource,
};

fn config(server: &MockServer, provider: LlmProviderKind, key: Option<&str>) -> LlmConfig {
    LlmConfig {
        provider,
        api_key: key.map(str::to_string),
        base_url: Some(server.uri()),
        timeout_secs: 5,
        ..Default::default()
    }
}

fn ollama_tags(models: &[&str]) -> serde_json::Value {
    json!({
        "models": models.iter().map(|m| json!({ "name": m })).collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn openai_sends_bearer_key_and_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hello" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  hi there \n" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        OpenAiBackend::new(&config(&server, LlmProviderKind::OpenAi, Some("sk-test"))).unwrap();
    backend.initialize().await.unwrap();
    assert_eq!(backend.generate("hello", "be brief").await.unwrap(), "hi there");
}

#[tokio::test]
async fn openai_status_codes_map_to_typed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer wrong"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer busy"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let generate = |key: &'static str| {
        let backend =
            OpenAiBackend::new(&config(&server, LlmProviderKind::OpenAi, Some(key))).unwrap();
        async move { backend.generate("p", "s").await }
    };

    assert_eq!(generate("wrong").await, Err(LlmError::Unauthorized));
    assert_eq!(generate("empty").await, Err(LlmError::EmptyResponse));
    match generate("busy").await {
        Err(LlmError::Unavailable(detail)) => assert!(detail.contains("503")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "choices": [{ "message": { "content": "late" } }] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut slow = config(&server, LlmProviderKind::OpenAi, Some("sk-test"));
    slow.timeout_secs = 1;
    let backend = OpenAiBackend::new(&slow).unwrap();
    assert_eq!(backend.generate("p", "s").await, Err(LlmError::Timeout));

    // the assistant still answers from the rules
    let assistant = Assistant::new(Some(Arc::new(backend)));
    let output = assistant.categorize("Buy milk and eggs").await;
    assert_eq!(output.source, OutputSource::Fallback);
}

#[tokio::test]
async fn gemini_passes_key_as_query_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", "g-key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "be brief" }] },
            "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "hi " }, { "text": "there" }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        GeminiBackend::new(&config(&server, LlmProviderKind::Gemini, Some("g-key"))).unwrap();
    assert_eq!(backend.generate("hello", "be brief").await.unwrap(), "hi there");
}

#[tokio::test]
async fn gemini_without_candidates_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let backend =
        GeminiBackend::new(&config(&server, LlmProviderKind::Gemini, Some("g-key"))).unwrap();
    assert_eq!(
        backend.generate("hello", "be brief").await,
        Err(LlmError::EmptyResponse)
    );
}

#[tokio::test]
async fn ollama_checks_installed_models_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ollama_tags(&["llama3.2:latest"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "llama3.2", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "Sure." },
            "done": true
        })))
        .expect(2)
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&config(&server, LlmProviderKind::Ollama, None)).unwrap();
    assert_eq!(backend.generate("a", "s").await.unwrap(), "Sure.");
    assert_eq!(backend.generate("b", "s").await.unwrap(), "Sure.");
}

#[tokio::test]
async fn ollama_reports_missing_model_without_pulling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ollama_tags(&["mistral:latest"])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(&config(&server, LlmProviderKind::Ollama, None)).unwrap();
    assert_eq!(
        backend.initialize().await,
        Err(LlmError::ModelNotInstalled("llama3.2".to_string()))
    );
    assert_eq!(
        backend.generate("a", "s").await,
        Err(LlmError::ModelNotInstalled("llama3.2".to_string()))
    );
}

#[tokio::test]
async fn assistant_uses_backend_output_and_falls_back_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "**\"Add a due date.\"**" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer bad"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let working = OpenAiBackend::new(&config(&server, LlmProviderKind::OpenAi, Some("good"))).unwrap();
    let assistant = Assistant::new(Some(Arc::new(working)));
    let output = assistant.suggest("Finish report").await;
    assert_eq!(output.source, OutputSource::Llm);
    assert_eq!(output.text, "Add a due date.");

    let failing = OpenAiBackend::new(&config(&server, LlmProviderKind::OpenAi, Some("bad"))).unwrap();
    let assistant = Assistant::new(Some(Arc::new(failing)));
    let output = assistant.categorize("Buy milk and eggs").await;
    assert_eq!(output.source, OutputSource::Fallback);
    assert_eq!(output.text, fallback_categories("Buy milk and eggs"));
}
