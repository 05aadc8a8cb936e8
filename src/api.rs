//! HTTP surface for DocQA.
//!
//! This module exposes a compact Axum router over the QA pipeline:
//!
//! - `POST /upload` – Multipart PDF upload; stores the document, builds the
//!   session index, and returns `{ok, status, pdf_key, chunks}`.
//! - `GET /status` – Current status record for the caller's session, or
//!   `{"status": "none"}` before the first upload.
//! - `POST /chat` – Answer a question (`{"question": ...}`, `q` accepted as
//!   an alias) against the session's index.
//! - `POST /reset` – Tear down the caller's session explicitly.
//! - `GET /health` – Liveness probe.
//! - `GET /metrics` – Ingestion and answer counters.
//!
//! Sessions ride in an opaque `docqa_session` cookie minted on first
//! contact; the core treats the value as an unstructured key and never
//! inspects it.

use crate::metrics::MetricsSnapshot;
use crate::pipeline::{AnswerError, QaApi};
use axum::{
    Json, Router,
    extract::{FromRequestParts, Multipart, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

/// Name of the cookie carrying the opaque session token.
pub const SESSION_COOKIE: &str = "docqa_session";

/// Build the HTTP router exposing the QA API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: QaApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_document::<S>))
        .route("/status", get(session_status::<S>))
        .route("/chat", post(chat::<S>))
        .route("/reset", post(reset_session::<S>))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Session token resolved from the request, minted when absent.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Opaque session token.
    pub id: String,
    /// Whether this request minted a fresh token.
    pub minted: bool,
}

fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for SessionIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match session_from_headers(&parts.headers) {
            Some(id) => Self { id, minted: false },
            None => Self {
                id: Uuid::new_v4().to_string(),
                minted: true,
            },
        })
    }
}

/// Attach the session cookie to responses that minted a fresh token.
fn with_session(session: &SessionIdentity, mut response: Response) -> Response {
    if session.minted
        && let Ok(value) = HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            session.id
        ))
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// Accept a multipart PDF upload and build the session's index.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    session: SessionIdentity,
    mut multipart: Multipart,
) -> Response
where
    S: QaApi,
{
    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    match field.bytes().await {
                        Ok(bytes) => upload = Some((filename, bytes.to_vec())),
                        Err(error) => {
                            tracing::warn!(error = %error, "Failed to read upload body");
                            return with_session(
                                &session,
                                error_response(StatusCode::BAD_REQUEST, "Invalid file."),
                            );
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(error = %error, "Invalid multipart payload");
                return with_session(
                    &session,
                    error_response(StatusCode::BAD_REQUEST, "Invalid upload payload."),
                );
            }
        }
    }

    let Some((filename, bytes)) = upload else {
        return with_session(
            &session,
            error_response(StatusCode::BAD_REQUEST, "No file provided."),
        );
    };
    if filename.is_empty() || bytes.is_empty() {
        return with_session(
            &session,
            error_response(StatusCode::BAD_REQUEST, "Invalid file."),
        );
    }

    match service.ingest_document(&session.id, &filename, bytes).await {
        Ok(outcome) => with_session(
            &session,
            Json(json!({
                "ok": true,
                "status": "ready",
                "pdf_key": outcome.pdf_key,
                "chunks": outcome.chunks,
            }))
            .into_response(),
        ),
        Err(error) => {
            tracing::error!(session = %session.id, error = %error, "Upload failed");
            with_session(
                &session,
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process the document.",
                ),
            )
        }
    }
}

/// Report the session's status record, or `none` before the first upload.
async fn session_status<S>(State(service): State<Arc<S>>, session: SessionIdentity) -> Response
where
    S: QaApi,
{
    let body = match service.session_status(&session.id).await {
        Some(record) => Json(json!(record)).into_response(),
        None => Json(json!({"status": "none"})).into_response(),
    };
    with_session(&session, body)
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: Option<String>,
    /// Short alias accepted for convenience.
    #[serde(default)]
    q: Option<String>,
}

/// Answer a question against the session's index.
async fn chat<S>(
    State(service): State<Arc<S>>,
    session: SessionIdentity,
    Json(request): Json<ChatRequest>,
) -> Response
where
    S: QaApi,
{
    let question = request
        .question
        .or(request.q)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let Some(question) = question else {
        return with_session(
            &session,
            error_response(StatusCode::BAD_REQUEST, "No question provided."),
        );
    };

    match service.answer_question(&session.id, &question).await {
        Ok(answer) => with_session(
            &session,
            Json(json!({"answer": answer, "reply": answer})).into_response(),
        ),
        Err(AnswerError::IndexNotReady) => with_session(
            &session,
            error_response(
                StatusCode::CONFLICT,
                "Index is not ready yet. Try again shortly.",
            ),
        ),
        Err(AnswerError::QuotaExceeded) => with_session(
            &session,
            error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Word limit reached. Session has been reset.",
            ),
        ),
        Err(error) => {
            tracing::error!(session = %session.id, error = %error, "Chat failed");
            with_session(
                &session,
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to generate an answer.",
                ),
            )
        }
    }
}

/// Tear down the caller's session explicitly.
async fn reset_session<S>(State(service): State<Arc<S>>, session: SessionIdentity) -> Response
where
    S: QaApi,
{
    let removed = service.reset_session(&session.id).await;
    with_session(
        &session,
        Json(json!({"ok": true, "removed": removed})).into_response(),
    )
}

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

/// Return the ingestion and answer counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: QaApi,
{
    Json(service.metrics_snapshot())
}
