mod common;
use atlas_common::AtlasError;
use atlas_llm::gemini::GeminiClient;
use atlas_llm::traits::{GenerationOptions, LlmClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-test";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key".to_string(), MODEL.to_string())
        .expect("client builds")
        .with_base_url(server.uri())
}

fn candidate_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "totalTokenCount": 42 }
    })
}

#[tokio::test]
async fn generate_sends_system_instruction_and_returns_text() {
    common::init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "be strict" }] },
            "contents": [{ "parts": [{ "text": "[\"https://x/opp/1-a\"]" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .generate(
            "[\"https://x/opp/1-a\"]",
            Some("be strict"),
            &GenerationOptions::default(),
        )
        .await
        .expect("generation succeeds");

    assert_eq!(response.text, "[]");
    assert_eq!(response.model.as_deref(), Some(MODEL));
    assert_eq!(response.tokens_used, Some(42));
}

#[tokio::test]
async fn per_call_model_override_changes_endpoint() {
    common::init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-other:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .generate(
            "hi",
            None,
            &GenerationOptions::with_model(Some("gemini-other".to_string())),
        )
        .await
        .expect("override succeeds");

    assert_eq!(response.model.as_deref(), Some("gemini-other"));
}

#[tokio::test]
async fn multi_part_candidates_are_concatenated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[{\"latlon\": " }, { "text": "[1, 2]}]" }] }
            }]
        })))
        .mount(&server)
        .await;

    let response = client_for(&server)
        .generate("p", None, &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(response.text, "[{\"latlon\": [1, 2]}]");
    assert_eq!(response.tokens_used, None);
}

#[tokio::test]
async fn http_failures_become_generation_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("p", None, &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AtlasError::Generation(ref m) if m == "Invalid API key"));
}

#[tokio::test]
async fn safety_blocks_and_empty_candidates_are_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/blocked:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/empty:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let blocked = client
        .generate("p", None, &GenerationOptions::with_model(Some("blocked".into())))
        .await
        .unwrap_err();
    assert!(blocked.to_string().contains("safety"));

    let empty = client
        .generate("p", None, &GenerationOptions::with_model(Some("empty".into())))
        .await
        .unwrap_err();
    assert!(matches!(empty, AtlasError::Generation(_)));
}

#[tokio::test]
async fn unreachable_server_is_reported_not_panicked() {
    let client = GeminiClient::new("k".into(), MODEL.into())
        .unwrap()
        .with_base_url("http://127.0.0.1:9");
    let err = client
        .generate("p", None, &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AtlasError::Generation(_)));
    assert!(!client.health_check().await.unwrap());
}
