
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::RagError;
use crate::rag::{QuestionAnswerer, RagAnswer};

const PAGE_TITLE: &str = "Retrieval-Augmented Generation (RAG) Bot";
const PAGE_INTRO: &str =
    "Ask a question, and the bot will retrieve relevant passages and provide a detailed response.";

/// Shared state for the web interface.
///
/// The pipeline sits behind a lock so one submission is processed fully
/// before the next begins; there is no cancellation of an in-flight request.
pub struct AppState {
    pipeline: Mutex<Box<dyn QuestionAnswerer>>,
}

impl AppState {
    #[inline]
    pub fn new(pipeline: Box<dyn QuestionAnswerer>) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    question: String,
}

#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<String> {
    Html(render_page(None))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AskForm>,
) -> Result<Html<String>, WebError> {
    let question = form.question.trim().to_string();
    if question.is_empty() {
        return Ok(Html(render_page(None)));
    }

    info!("Processing question (length: {})", question.len());

    let result = tokio::task::spawn_blocking(move || {
        let pipeline = state
            .pipeline
            .lock()
            .map_err(|_| RagError::Other(anyhow::anyhow!("pipeline lock poisoned")))?;
        pipeline.answer(&question)
    })
    .await
    .map_err(|e| WebError(RagError::Other(anyhow::anyhow!("pipeline task failed: {e}"))))??;

    Ok(Html(render_page(Some(&result))))
}

/// A pipeline failure surfaced to the browser: fail loud, no retry.
#[derive(Debug)]
pub struct WebError(RagError);

impl From<RagError> for WebError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            RagError::Connection(_)
            | RagError::Embedding(_)
            | RagError::Search(_)
            | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
            RagError::Config(_) | RagError::Io(_) | RagError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        error!("Request failed: {}", self.0);
        (status, Html(render_error(&self.0))).into_response()
    }
}

fn render_page(result: Option<&RagAnswer>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{PAGE_TITLE}</h1>");
    let _ = writeln!(body, "<p>{PAGE_INTRO}</p>");
    body.push_str(
        "<form method=\"post\" action=\"/ask\">\n\
         <label for=\"question\">Enter your question:</label>\n\
         <input type=\"text\" id=\"question\" name=\"question\" size=\"80\">\n\
         <button type=\"submit\">Ask</button>\n\
         </form>\n",
    );

    if let Some(answer) = result {
        let _ = writeln!(body, "<h2>Answer</h2>");
        let _ = writeln!(body, "<p>{}</p>", escape_html(&answer.answer));

        let _ = writeln!(body, "<h2>Supporting Passages</h2>");
        for (idx, passage) in answer.context.split("\n\n").enumerate() {
            let _ = writeln!(body, "<p>Passage {}: {}</p>", idx + 1, escape_html(passage));
        }
    }

    wrap_document(&body)
}

fn render_error(err: &RagError) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{PAGE_TITLE}</h1>");
    let _ = writeln!(body, "<h2>Error</h2>");
    let _ = writeln!(body, "<p>{}</p>", escape_html(&err.to_string()));
    let _ = writeln!(body, "<p><a href=\"/\">Ask another question</a></p>");

    wrap_document(&body)
}

fn wrap_document(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{PAGE_TITLE}</title>\n\
         </head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
