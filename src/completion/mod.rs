//! Chat completion client abstraction and adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::get_config;

/// Errors raised by chat completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider could not be reached or refused the request.
    #[error("Completion provider unavailable: {0}")]
    Unavailable(String),
    /// Provider responded without any answer content.
    #[error("Completion response contained no content")]
    EmptyResponse,
}

/// Interface implemented by chat completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce an answer from the instruction template, retrieved context, and question.
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, CompletionError>;
}

/// Completion backend speaking an OpenAI-compatible `/chat/completions` API.
pub struct HttpCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_output_tokens: usize,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl HttpCompletionClient {
    /// Construct a client against an explicit endpoint.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        max_output_tokens: usize,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .user_agent("docqa/0.1")
            .build()
            .map_err(|error| CompletionError::Unavailable(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_output_tokens,
        })
    }

    /// Construct the client named by the process configuration.
    pub fn from_config() -> Result<Self, CompletionError> {
        let config = get_config();
        Self::new(
            config.completion_url.clone(),
            config.completion_api_key.clone(),
            config.completion_model.clone(),
            config.max_output_tokens,
        )
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let user_prompt = format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:");
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "temperature": 0.2,
            "max_tokens": self.max_output_tokens,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| CompletionError::Unavailable(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Unavailable(format!(
                "{status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::Unavailable(error.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn complete_sends_prompt_and_returns_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(r#"{"model": "test-chat", "temperature": 0.2}"#)
                    .body_contains("Question: What is covered?");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"content": "The warranty covers parts."}}]
                }));
            })
            .await;

        let client = HttpCompletionClient::new(server.base_url(), None, "test-chat".into(), 512)
            .expect("client");
        let answer = client
            .complete("Answer only from context.", "warranty text", "What is covered?")
            .await
            .expect("complete");

        mock.assert();
        assert_eq!(answer, "The warranty covers parts.");
    }

    #[tokio::test]
    async fn complete_maps_empty_choices_to_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .json_body(serde_json::json!({"choices": []}));
            })
            .await;

        let client = HttpCompletionClient::new(server.base_url(), None, "test-chat".into(), 512)
            .expect("client");
        let error = client.complete("sys", "ctx", "q").await.unwrap_err();
        assert!(matches!(error, CompletionError::EmptyResponse));
    }

    #[tokio::test]
    async fn complete_surfaces_provider_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let client = HttpCompletionClient::new(server.base_url(), None, "test-chat".into(), 512)
            .expect("client");
        let error = client.complete("sys", "ctx", "q").await.unwrap_err();
        assert!(matches!(error, CompletionError::Unavailable(_)));
    }
}
