//! Language-model adapters and the commentary generator over HTTP.

use std::sync::Arc;

use serde_json::json;
use tweet_archive_bot::commentary::{
    AnthropicModel, CommentaryGenerator, CommentaryOutcome, LanguageModel, OpenAiModel,
    PostContent,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn content() -> PostContent {
    PostContent {
        text: "The bridge opened today after ten years of work".to_string(),
        username: "alice".to_string(),
        timestamp: Some("2024-05-01T12:00:00.000Z".to_string()),
        media: Vec::new(),
    }
}

#[tokio::test]
async fn test_openai_invoke() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "messages": [{ "role": "user", "content": "hello" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "hi there" } }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let model = OpenAiModel::new("sk-test", "gpt-4")
        .unwrap()
        .with_base_url(&mock_server.uri());

    assert_eq!(model.invoke("hello").await.unwrap(), "hi there");
}

#[tokio::test]
async fn test_anthropic_invoke_joins_text_blocks() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "text", "text": "second" }
            ]
        })))
        .mount(&mock_server)
        .await;

    let model = AnthropicModel::new("sk-ant", "claude-3-sonnet-20240229")
        .unwrap()
        .with_base_url(&mock_server.uri());

    assert_eq!(model.invoke("hello").await.unwrap(), "first\nsecond");
}

#[tokio::test]
async fn test_provider_error_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&mock_server)
        .await;

    let model = AnthropicModel::new("bad", "claude-3-sonnet-20240229")
        .unwrap()
        .with_base_url(&mock_server.uri());

    let err = model.invoke("hello").await.unwrap_err();
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_generator_parses_fenced_model_output() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content":
                "```json\n{\"commentary\":\"A milestone for the city\",\"confidence\":0.8,\"topics\":[\"infrastructure\"]}\n```"
            } }]
        })))
        .mount(&mock_server)
        .await;

    let model: Arc<dyn LanguageModel> = Arc::new(
        OpenAiModel::new("sk-test", "gpt-4")
            .unwrap()
            .with_base_url(&mock_server.uri()),
    );
    let outcome = CommentaryGenerator::new(model).generate(&content()).await;

    let CommentaryOutcome::Generated(commentary) = &outcome else {
        panic!("expected generated commentary, got {outcome:?}");
    };
    assert_eq!(commentary.commentary, "A milestone for the city");
    assert!((commentary.confidence - 0.8).abs() < f64::EPSILON);
    assert_eq!(commentary.topics, vec!["infrastructure".to_string()]);
}

#[tokio::test]
async fn test_generator_reports_unreachable_model() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let model: Arc<dyn LanguageModel> = Arc::new(
        OpenAiModel::new("sk-test", "gpt-4")
            .unwrap()
            .with_base_url(&mock_server.uri()),
    );
    let generator = CommentaryGenerator::new(model);

    assert!(!generator.check_connection().await);
    assert!(matches!(
        generator.generate(&content()).await,
        CommentaryOutcome::Failed { .. }
    ));
}
