//! End-to-end session lifecycle tests over the in-memory blob store.
//!
//! Uploads go through a plain-text extraction strategy so the suite can
//! control the exact document text; embedding uses the deterministic hashed
//! client and completions come from a scripted stub.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docqa::{
    api,
    completion::{CompletionClient, CompletionError},
    config::{CONFIG, Config, EmbeddingBackend},
    embedding::{EmbedError, EmbeddingClient, HashedEmbeddingClient},
    extract::{ExtractorChain, ExtractorStrategy},
    pipeline::{AnswerError, IngestError, QaService},
    session::{QuotaTracker, SessionStatus, StatusFields, StatusLedger},
    storage::{BlobStore, MemoryBlobStore},
};
use std::sync::Mutex as StdMutex;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

fn ensure_test_config() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = CONFIG.set(Config {
            doc_bucket: "docs-test".into(),
            index_bucket: "indexes-test".into(),
            storage_region: "us-east-1".into(),
            storage_endpoint: None,
            embedding_backend: EmbeddingBackend::Hashed,
            embedding_url: None,
            embedding_api_key: None,
            embedding_model: "hashed-bytefold".into(),
            embedding_dimension: 32,
            completion_url: "http://127.0.0.1:9".into(),
            completion_api_key: None,
            completion_model: "test-chat".into(),
            max_output_tokens: 512,
            chunk_size: 1000,
            chunk_overlap: 150,
            max_session_tokens: 100,
            search_top_k: 6,
            server_port: None,
        });
    });
}

/// Extraction strategy that reads the upload as UTF-8 text.
struct PlainTextStrategy;

impl ExtractorStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn extract(&self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        Ok(vec![String::from_utf8(bytes.to_vec())?])
    }
}

/// Embedding client that fails on its n-th call.
struct FailAtEmbeddingClient {
    inner: HashedEmbeddingClient,
    fail_at: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingClient for FailAtEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_at {
            return Err(EmbedError::Unavailable("provider throttled".to_string()));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

/// Completion client replaying a scripted list of answers.
struct ScriptedCompletionClient {
    answers: StdMutex<VecDeque<String>>,
}

impl ScriptedCompletionClient {
    fn new(answers: Vec<String>) -> Self {
        Self {
            answers: StdMutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(
        &self,
        _system_prompt: &str,
        _context: &str,
        _question: &str,
    ) -> Result<String, CompletionError> {
        Ok(self
            .answers
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| "stub answer".to_string()))
    }
}

fn build_service(
    blob: Arc<MemoryBlobStore>,
    embedder: Arc<dyn EmbeddingClient>,
    completer: Arc<dyn CompletionClient>,
) -> QaService {
    ensure_test_config();
    QaService::with_components(
        blob,
        ExtractorChain::new(vec![Box::new(PlainTextStrategy)]),
        embedder,
        completer,
    )
}

fn default_service(blob: Arc<MemoryBlobStore>) -> QaService {
    build_service(
        blob,
        Arc::new(HashedEmbeddingClient::new(32)),
        Arc::new(ScriptedCompletionClient::new(Vec::new())),
    )
}

/// 4400 characters split at size 1000 / overlap 150 into exactly 5 windows.
fn five_segment_text() -> String {
    "abcdefghij".repeat(440)
}

fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

#[tokio::test]
async fn upload_builds_index_and_marks_session_ready() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = default_service(blob.clone());

    let outcome = service
        .ingest_document("sess-a", "User Manual.pdf", five_segment_text().into_bytes())
        .await
        .expect("ingest");

    assert_eq!(outcome.chunks, 5);
    assert!(outcome.pdf_key.starts_with("sess-a/"));
    assert!(outcome.pdf_key.ends_with("-User_Manual.pdf"));

    let record = service.session_status("sess-a").await.expect("record");
    assert_eq!(record.status, SessionStatus::Ready);
    assert_eq!(record.pdf_key.as_deref(), Some(outcome.pdf_key.as_str()));

    // raw document plus both index artifacts are durable
    assert_eq!(blob.list("docs-test", "sess-a/").await.expect("list").len(), 1);
    let index_keys = blob
        .list("indexes-test", "sess-a/index.")
        .await
        .expect("list");
    assert_eq!(
        index_keys,
        vec!["sess-a/index.segments.json", "sess-a/index.vectors.json"]
    );

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.documents_indexed, 1);
    assert_eq!(snapshot.segments_indexed, 5);
}

#[tokio::test]
async fn question_before_index_is_ready_is_rejected() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = default_service(blob.clone());

    // nothing uploaded yet
    let error = service
        .answer_question("sess-b", "anything yet?")
        .await
        .unwrap_err();
    assert!(matches!(error, AnswerError::IndexNotReady));

    // upload started but the build has not landed a terminal state
    let ledger = StatusLedger::new(blob.clone(), "indexes-test".to_string());
    ledger
        .write(
            "sess-b",
            SessionStatus::Uploaded,
            StatusFields::filename("manual.pdf"),
        )
        .await
        .expect("write");

    let error = service
        .answer_question("sess-b", "ready now?")
        .await
        .unwrap_err();
    assert!(matches!(error, AnswerError::IndexNotReady));
}

#[tokio::test]
async fn embedding_failure_aborts_build_without_artifacts() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = build_service(
        blob.clone(),
        Arc::new(FailAtEmbeddingClient {
            inner: HashedEmbeddingClient::new(32),
            fail_at: 3,
            calls: AtomicUsize::new(0),
        }),
        Arc::new(ScriptedCompletionClient::new(Vec::new())),
    );

    let error = service
        .ingest_document("sess-c", "manual.pdf", five_segment_text().into_bytes())
        .await
        .unwrap_err();
    assert!(matches!(error, IngestError::Embedding(_)));

    let record = service.session_status("sess-c").await.expect("record");
    assert_eq!(record.status, SessionStatus::Error);
    assert!(
        record
            .message
            .as_deref()
            .expect("message")
            .contains("throttled")
    );

    // no partial index pair was persisted
    assert!(
        blob.list("indexes-test", "sess-c/index.")
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn quota_accumulates_and_exhaustion_purges_the_session() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = build_service(
        blob.clone(),
        Arc::new(HashedEmbeddingClient::new(32)),
        Arc::new(ScriptedCompletionClient::new(vec![words(40), words(60)])),
    );

    service
        .ingest_document("sess-d", "manual.pdf", five_segment_text().into_bytes())
        .await
        .expect("ingest");

    let quota = QuotaTracker::new(blob.clone(), "indexes-test".to_string());
    let question = "what is the warranty period";

    let answer = service
        .answer_question("sess-d", question)
        .await
        .expect("round 1");
    assert_eq!(answer.split_whitespace().count(), 40);
    assert_eq!(quota.current("sess-d").await.expect("usage"), 45);

    // 45 < 100, so the second round still runs
    service
        .answer_question("sess-d", question)
        .await
        .expect("round 2");
    assert_eq!(quota.current("sess-d").await.expect("usage"), 110);

    // 110 >= 100: gate trips, session is destroyed
    let error = service
        .answer_question("sess-d", question)
        .await
        .unwrap_err();
    assert!(matches!(error, AnswerError::QuotaExceeded));

    assert!(service.session_status("sess-d").await.is_none());
    assert!(blob.list("docs-test", "sess-d/").await.expect("list").is_empty());
    assert!(
        blob.list("indexes-test", "sess-d/")
            .await
            .expect("list")
            .is_empty()
    );
    assert_eq!(service.metrics_snapshot().sessions_purged, 1);
}

#[tokio::test]
async fn reupload_replaces_the_previous_index() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = default_service(blob.clone());

    let first = service
        .ingest_document("sess-e", "v1.pdf", five_segment_text().into_bytes())
        .await
        .expect("first ingest");
    assert_eq!(first.chunks, 5);

    let second = service
        .ingest_document("sess-e", "v2.pdf", "short replacement text".as_bytes().to_vec())
        .await
        .expect("second ingest");
    assert_eq!(second.chunks, 1);

    let record = service.session_status("sess-e").await.expect("record");
    assert_eq!(record.status, SessionStatus::Ready);
    assert_eq!(record.pdf_key.as_deref(), Some(second.pdf_key.as_str()));

    // both raw uploads remain (superseded, not deleted); index keys stay fixed
    assert_eq!(blob.list("docs-test", "sess-e/").await.expect("list").len(), 2);
    assert_eq!(
        blob.list("indexes-test", "sess-e/index.")
            .await
            .expect("list")
            .len(),
        2
    );
}

#[tokio::test]
async fn answers_are_grounded_in_the_sessions_own_index() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = default_service(blob.clone());

    service
        .ingest_document(
            "sess-f",
            "notes.pdf",
            b"the warranty period lasts two years from purchase".to_vec(),
        )
        .await
        .expect("ingest");

    let answer = service
        .answer_question("sess-f", "how long is the warranty?")
        .await
        .expect("answer");
    assert_eq!(answer, "stub answer");
}

#[tokio::test]
async fn router_drives_the_full_upload_status_chat_cycle() {
    let blob = Arc::new(MemoryBlobStore::new());
    let service = Arc::new(default_service(blob));
    let app = api::create_router(service);

    let boundary = "session-flow-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"manual.pdf\"\r\n\
         Content-Type: application/pdf\r\n\r\n\
         {}\r\n\
         --{boundary}--\r\n",
        five_segment_text()
    );
    let upload = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .header("cookie", "docqa_session=sess-g")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("upload response");
    assert_eq!(upload.status(), StatusCode::OK);
    let upload_json: serde_json::Value = serde_json::from_slice(
        &to_bytes(upload.into_body(), usize::MAX).await.expect("body"),
    )
    .expect("json");
    assert_eq!(upload_json["status"], "ready");
    assert_eq!(upload_json["chunks"], 5);

    let status = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/status")
                .header("cookie", "docqa_session=sess-g")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("status response");
    let status_json: serde_json::Value = serde_json::from_slice(
        &to_bytes(status.into_body(), usize::MAX).await.expect("body"),
    )
    .expect("json");
    assert_eq!(status_json["status"], "ready");

    let chat = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .header("content-type", "application/json")
                .header("cookie", "docqa_session=sess-g")
                .body(Body::from(r#"{"question": "what does it say?"}"#))
                .expect("request"),
        )
        .await
        .expect("chat response");
    assert_eq!(chat.status(), StatusCode::OK);
    let chat_json: serde_json::Value = serde_json::from_slice(
        &to_bytes(chat.into_body(), usize::MAX).await.expect("body"),
    )
    .expect("json");
    assert_eq!(chat_json["answer"], "stub answer");
}
