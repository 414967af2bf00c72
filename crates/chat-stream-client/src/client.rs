use std::sync::Arc;

use tracing::debug;

use crate::config::ClientConfig;
use crate::content::{ChatResult, HealthStatus, StreamOutcome};
use crate::errors::ChatError;
use crate::fallback::{request_json, send_with_fallback};
use crate::sink::{CallbackSink, TokenSink};
use crate::stream::{AbortHandle, ChatStream};

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
}

/// Entry point for asking questions of the chat service.
///
/// Each call owns its own decode buffer and answer accumulator; the client
/// itself holds only configuration and the shared HTTP connection pool.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(ClientInner { http, config }),
        })
    }

    /// Creates a client configured from `CHAT_*` environment variables.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Asks `question`, calling `on_token` for each streamed delta.
    ///
    /// Falls back to the non-streaming endpoint if the stream fails. Dropping
    /// the returned future closes the connection and stops token delivery.
    pub async fn send<F>(&self, question: &str, on_token: F) -> Result<ChatResult, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        self.send_with_abort(question, &AbortHandle::new(), on_token)
            .await
    }

    /// Like `send`, but stops with `ChatError::Cancelled` when `abort` fires.
    pub async fn send_with_abort<F>(
        &self,
        question: &str,
        abort: &AbortHandle,
        on_token: F,
    ) -> Result<ChatResult, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        let mut sink = CallbackSink::new(on_token);
        self.send_to_sink(question, abort, &mut sink).await
    }

    /// Like `send_with_abort`, delivering deltas to a custom `TokenSink`.
    pub async fn send_to_sink(
        &self,
        question: &str,
        abort: &AbortHandle,
        sink: &mut dyn TokenSink,
    ) -> Result<ChatResult, ChatError> {
        let question = validate_question(question)?;
        let request_id = uuid::Uuid::new_v4();
        let mut signal = abort.signal();
        send_with_fallback(&self.inner, request_id, &question, sink, &mut signal).await
    }

    /// Starts a request whose events are delivered through a bounded channel.
    pub async fn start_stream(&self, question: &str) -> Result<ChatStream, ChatError> {
        let question = validate_question(question)?;
        Ok(ChatStream::spawn(self.inner.clone(), question))
    }

    /// Asks `question` through the non-streaming endpoint only.
    pub async fn ask_json(&self, question: &str) -> Result<StreamOutcome, ChatError> {
        let question = validate_question(question)?;
        let mut signal = AbortHandle::new().signal();
        request_json(
            &self.inner.http,
            &self.inner.config,
            uuid::Uuid::new_v4(),
            &question,
            &mut signal,
        )
        .await
    }

    /// Queries the service health route.
    pub async fn health(&self) -> Result<HealthStatus, ChatError> {
        let url = self.inner.config.health_url();
        debug!(%url, "checking chat service health");
        let response = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::transport(format!("health request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::http(
                status.as_u16(),
                format!("health check failed with status {status}"),
                (!body.is_empty()).then_some(body),
            ));
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| ChatError::protocol(format!("invalid health response: {e}")))
    }
}

fn validate_question(question: &str) -> Result<String, ChatError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ChatError::Validation("question must not be empty".into()));
    }
    Ok(question.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_config() {
        let result = ChatClient::new(ClientConfig::default().stream_path("chat"));
        assert!(matches!(result, Err(ChatError::Config(msg)) if msg.contains("stream_path")));
    }

    #[test]
    fn questions_are_trimmed_and_blank_ones_rejected() {
        assert_eq!(validate_question("  hi there \n").as_deref(), Ok("hi there"));
        assert!(matches!(
            validate_question(" \t\n"),
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn blank_question_fails_before_any_request() {
        let client = ChatClient::new(ClientConfig::new("http://127.0.0.1:9")).expect("client");
        let err = client
            .send("   ", |_delta: &str| panic!("no tokens expected"))
            .await
            .expect_err("blank question");
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(matches!(
            client.start_stream("").await,
            Err(ChatError::Validation(_))
        ));
    }
}
