//! Fallback orchestration: stream first, then a single non-streaming request.

use tracing::{debug, info, warn};

use crate::client::ClientInner;
use crate::config::ClientConfig;
use crate::content::{ChatRequest, ChatResult, JsonAnswer, ResultSource, StreamOutcome};
use crate::errors::ChatError;
use crate::session::run_stream;
use crate::sink::TokenSink;
use crate::stream::AbortSignal;

/// Runs the streaming session and, if it fails, the JSON request.
///
/// A failure of the JSON request is returned as is; there is no further
/// fallback. Cancellation is never retried.
pub(crate) async fn send_with_fallback(
    inner: &ClientInner,
    request_id: uuid::Uuid,
    question: &str,
    sink: &mut dyn TokenSink,
    abort: &mut AbortSignal,
) -> Result<ChatResult, ChatError> {
    info!(%request_id, "starting streaming chat request");
    let stream_err = match run_stream(
        &inner.http,
        &inner.config,
        request_id,
        question,
        sink,
        abort,
    )
    .await
    {
        Ok(outcome) => {
            info!(%request_id, chars = outcome.full_text.chars().count(), "chat stream completed");
            return Ok(ChatResult {
                outcome,
                source: ResultSource::Streaming,
            });
        }
        Err(err) if !err.allows_fallback() => return Err(err),
        Err(err) => err,
    };

    warn!(%request_id, error = %stream_err, "chat stream failed, falling back to JSON endpoint");
    sink.on_fallback(&stream_err).await?;

    match request_json(&inner.http, &inner.config, request_id, question, abort).await {
        Ok(outcome) => {
            info!(%request_id, "fallback request completed");
            Ok(ChatResult {
                outcome,
                source: ResultSource::Fallback,
            })
        }
        Err(err) => {
            warn!(%request_id, error = %err, "fallback request failed");
            Err(err)
        }
    }
}

/// Issues one POST to the non-streaming endpoint and normalizes its answer.
pub(crate) async fn request_json(
    http: &reqwest::Client,
    config: &ClientConfig,
    request_id: uuid::Uuid,
    question: &str,
    abort: &mut AbortSignal,
) -> Result<StreamOutcome, ChatError> {
    debug!(%request_id, url = %config.json_url(), "sending JSON chat request");
    let request = http.post(config.json_url()).json(&ChatRequest {
        question: question.to_string(),
    });

    let response = tokio::select! {
        biased;
        _ = abort.aborted() => return Err(ChatError::Cancelled),
        sent = request.send() => sent.map_err(|e| {
            ChatError::transport(format!("fallback request failed: {e}"))
        })?,
    };
    let status = response.status();
    let body = tokio::select! {
        biased;
        _ = abort.aborted() => return Err(ChatError::Cancelled),
        text = response.text() => text,
    };

    if !status.is_success() {
        let body = body.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| detail_message(&value))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(ChatError::http(
            status.as_u16(),
            message,
            (!body.is_empty()).then_some(body),
        ));
    }

    let body = body.map_err(|e| ChatError::transport(format!("fallback body read failed: {e}")))?;
    // A 2xx body that is not JSON still yields an answer (the sentinel).
    let answer = serde_json::from_str::<JsonAnswer>(&body).unwrap_or_else(|e| {
        debug!(%request_id, error = %e, "fallback response is not a JSON answer");
        JsonAnswer::default()
    });
    Ok(answer.into_outcome())
}

fn detail_message(value: &serde_json::Value) -> Option<String> {
    match value.get("detail")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) if text.is_empty() => None,
        serde_json::Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
