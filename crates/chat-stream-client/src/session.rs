//! Streaming session: one POST to the SSE endpoint turned into a
//! `StreamOutcome`.

use std::fmt::Display;

use futures::{Stream, StreamExt as _};
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::content::{ChatRequest, StreamOutcome};
use crate::errors::ChatError;
use crate::frame::{Frame, FrameDecoder};
use crate::sink::TokenSink;
use crate::stream::AbortSignal;

/// Reason reported for an `error` event without a usable `message`.
pub const UNKNOWN_STREAM_ERROR: &str = "Unknown error";

/// Opens the streaming request and reads it to completion.
pub(crate) async fn run_stream(
    http: &reqwest::Client,
    config: &ClientConfig,
    request_id: uuid::Uuid,
    question: &str,
    sink: &mut dyn TokenSink,
    abort: &mut AbortSignal,
) -> Result<StreamOutcome, ChatError> {
    debug!(%request_id, url = %config.stream_url(), "opening chat stream");
    let request = http
        .post(config.stream_url())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(&ChatRequest {
            question: question.to_string(),
        });

    let response = tokio::select! {
        biased;
        _ = abort.aborted() => return Err(ChatError::Cancelled),
        sent = request.send() => sent.map_err(|e| {
            ChatError::transport(format!("stream request failed: {e}"))
        })?,
    };

    let status = response.status();
    if !status.is_success() {
        // The status is what matters; a body read failure only loses detail.
        let body = tokio::select! {
            biased;
            _ = abort.aborted() => return Err(ChatError::Cancelled),
            text = response.text() => text.unwrap_or_default(),
        };
        let detail = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("").to_string()
        } else {
            body.clone()
        };
        return Err(ChatError::http(
            status.as_u16(),
            format!("Stream HTTP {}: {detail}", status.as_u16()),
            (!body.is_empty()).then_some(body),
        ));
    }

    read_frames(
        response.bytes_stream(),
        config.max_buffer_bytes,
        request_id,
        sink,
        abort,
    )
    .await
}

/// Drives a chunked body through the frame decoder and dispatches events.
///
/// End of input without an `error` event is a success, whether or not a
/// `done` event was seen.
pub(crate) async fn read_frames<S, E>(
    mut chunks: S,
    max_buffer_bytes: usize,
    request_id: uuid::Uuid,
    sink: &mut dyn TokenSink,
    abort: &mut AbortSignal,
) -> Result<StreamOutcome, ChatError>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Display,
{
    let mut decoder = FrameDecoder::new(max_buffer_bytes);
    let mut outcome = StreamOutcome::default();
    loop {
        let next = tokio::select! {
            biased;
            _ = abort.aborted() => return Err(ChatError::Cancelled),
            next = chunks.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                return Err(ChatError::transport(format!("stream read failed: {e}")));
            }
            None => break,
        };

        for frame in decoder.push_bytes(&chunk)? {
            if abort.is_aborted() {
                return Err(ChatError::Cancelled);
            }
            dispatch(frame, &mut outcome, request_id, sink).await?;
        }
    }

    if let Some(tail) = decoder.finish() {
        debug!(%request_id, bytes = tail.len(), "discarding undelimited input at end of stream");
    }
    Ok(outcome)
}

async fn dispatch(
    frame: Frame,
    outcome: &mut StreamOutcome,
    request_id: uuid::Uuid,
    sink: &mut dyn TokenSink,
) -> Result<(), ChatError> {
    match frame.event.as_str() {
        "token" => {
            let delta = frame
                .payload
                .get("delta")
                .and_then(|v| v.as_str())
                .filter(|d| !d.is_empty());
            if let Some(delta) = delta {
                trace!(%request_id, len = delta.len(), "token delta");
                outcome.full_text.push_str(delta);
                sink.on_token(delta).await?;
            }
        }
        "done" => {
            debug!(%request_id, "done event received");
            outcome.terminal_payload = (!frame.payload.is_null()).then_some(frame.payload);
        }
        "error" => {
            let message = frame
                .payload
                .get("message")
                .and_then(|v| v.as_str())
                .filter(|m| !m.is_empty())
                .unwrap_or(UNKNOWN_STREAM_ERROR);
            return Err(ChatError::protocol(message));
        }
        other => trace!(%request_id, event = other, "ignoring stream event"),
    }
    Ok(())
}
