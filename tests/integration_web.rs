#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Web interface tests with a stubbed pipeline behind the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use wiki_rag::rag::{QuestionAnswerer, RagAnswer};
use wiki_rag::web::{AppState, router};
use wiki_rag::{RagError, Result};

struct StubPipeline;

impl QuestionAnswerer for StubPipeline {
    fn answer(&self, question: &str) -> Result<RagAnswer> {
        Ok(RagAnswer {
            answer: format!("Stub answer to: {question}"),
            context: "Paris is the capital of France.\n\nFrance is in Europe.".to_string(),
        })
    }
}

struct FailingPipeline;

impl QuestionAnswerer for FailingPipeline {
    fn answer(&self, _question: &str) -> Result<RagAnswer> {
        Err(RagError::Generation("model unavailable".to_string()))
    }
}

fn stub_app() -> axum::Router {
    router(Arc::new(AppState::new(Box::new(StubPipeline))))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
}

fn ask_request(form_body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body.to_string()))
        .expect("request should build")
}

#[tokio::test]
async fn index_renders_question_form() {
    let response = stub_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request should build"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("Retrieval-Augmented Generation (RAG) Bot"));
    assert!(page.contains("name=\"question\""));
    assert!(!page.contains("<h2>Answer</h2>"));
}

#[tokio::test]
async fn submission_renders_answer_and_numbered_passages() {
    let response = stub_app()
        .oneshot(ask_request("question=What%20is%20the%20capital%20of%20France%3F"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("<h2>Answer</h2>"));
    assert!(page.contains("Stub answer to: What is the capital of France?"));
    assert!(page.contains("<h2>Supporting Passages</h2>"));

    let first = page
        .find("Passage 1: Paris is the capital of France.")
        .expect("first passage rendered");
    let second = page
        .find("Passage 2: France is in Europe.")
        .expect("second passage rendered");
    assert!(first < second);
}

#[tokio::test]
async fn empty_submission_re_renders_the_form() {
    let response = stub_app()
        .oneshot(ask_request("question="))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("name=\"question\""));
    assert!(!page.contains("<h2>Answer</h2>"));
}

#[tokio::test]
async fn whitespace_only_submission_re_renders_the_form() {
    let response = stub_app()
        .oneshot(ask_request("question=%20%20%20"))
        .await
        .expect("request should succeed");

    let page = body_text(response).await;
    assert!(!page.contains("<h2>Answer</h2>"));
}

#[tokio::test]
async fn pipeline_failure_renders_error_page() {
    let app = router(Arc::new(AppState::new(Box::new(FailingPipeline))));

    let response = app
        .oneshot(ask_request("question=anything"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let page = body_text(response).await;
    assert!(page.contains("<h2>Error</h2>"));
    assert!(page.contains("Generation error: model unavailable"));
}
