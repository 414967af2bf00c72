//! Channel-based chat handle, event types, and cancellation.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::client::ClientInner;
use crate::content::ChatResult;
use crate::errors::ChatError;
use crate::fallback::send_with_fallback;
use crate::sink::TokenSink;

/// Handle used to cancel an in-flight chat request.
///
/// Firing it drops the open response (closing the connection), stops token
/// delivery, and makes the request fail with `ChatError::Cancelled`.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    /// Creates a handle that has not fired.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of an `AbortHandle`, polled at every suspension point.
pub(crate) struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Resolves once cancellation is requested; never resolves otherwise.
    pub(crate) async fn aborted(&mut self) {
        let closed = self.rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Events produced by `ChatStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// First event for every request.
    Started { request_id: uuid::Uuid },
    /// Incremental answer text from the stream.
    Delta {
        request_id: uuid::Uuid,
        seq: u64,
        text: String,
    },
    /// The stream failed; earlier deltas are superseded by the fallback answer.
    FallbackStarted {
        request_id: uuid::Uuid,
        reason: ChatError,
    },
    /// Terminal success event.
    Completed {
        request_id: uuid::Uuid,
        result: ChatResult,
    },
    /// Terminal failure event.
    Error {
        request_id: uuid::Uuid,
        error: ChatError,
    },
}

impl ChatEvent {
    /// Returns true for `Completed` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

/// Streaming handle returned by `ChatClient::start_stream`.
///
/// Use `next_event()` to consume events as they arrive and `finish()` to
/// obtain the final result. Dropping the handle cancels the request.
pub struct ChatStream {
    request_id: uuid::Uuid,
    rx: mpsc::Receiver<ChatEvent>,
    final_rx: oneshot::Receiver<Result<ChatResult, ChatError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl ChatStream {
    pub(crate) fn spawn(inner: Arc<ClientInner>, question: String) -> Self {
        let request_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(inner.config.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let abort_handle = AbortHandle::new();
        tokio::spawn(chat_task(
            inner,
            request_id,
            question,
            tx,
            final_tx,
            abort_handle.clone(),
        ));
        Self {
            request_id,
            rx,
            final_rx,
            abort_handle,
            saw_terminal: false,
        }
    }

    /// Returns the id used in this request's log fields and events.
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Returns a handle that can cancel the request.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next event.
    ///
    /// Returns `None` after the channel is closed.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(ChatEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events (if any) and returns the terminal result.
    pub async fn finish(mut self) -> Result<ChatResult, ChatError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match (&mut self.final_rx).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::protocol(format!(
                "chat task ended without a final result (request_id={})",
                self.request_id
            ))),
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        if !self.saw_terminal {
            self.abort_handle.abort();
        }
    }
}

/// Forwards deltas into the event channel.
struct ChannelSink {
    request_id: uuid::Uuid,
    seq: u64,
    tx: mpsc::Sender<ChatEvent>,
}

#[async_trait::async_trait]
impl TokenSink for ChannelSink {
    async fn on_token(&mut self, delta: &str) -> Result<(), ChatError> {
        let event = ChatEvent::Delta {
            request_id: self.request_id,
            seq: self.seq,
            text: delta.to_string(),
        };
        self.seq = self.seq.saturating_add(1);
        self.tx.send(event).await.map_err(|_| ChatError::Cancelled)
    }

    async fn on_fallback(&mut self, reason: &ChatError) -> Result<(), ChatError> {
        let event = ChatEvent::FallbackStarted {
            request_id: self.request_id,
            reason: reason.clone(),
        };
        self.tx.send(event).await.map_err(|_| ChatError::Cancelled)
    }
}

async fn chat_task(
    inner: Arc<ClientInner>,
    request_id: uuid::Uuid,
    question: String,
    tx: mpsc::Sender<ChatEvent>,
    final_tx: oneshot::Sender<Result<ChatResult, ChatError>>,
    abort_handle: AbortHandle,
) {
    if tx.send(ChatEvent::Started { request_id }).await.is_err() {
        let _ = final_tx.send(Err(ChatError::Cancelled));
        return;
    }

    let mut sink = ChannelSink {
        request_id,
        seq: 0,
        tx: tx.clone(),
    };
    let mut signal = abort_handle.signal();
    let result = send_with_fallback(&inner, request_id, &question, &mut sink, &mut signal).await;

    let terminal = match &result {
        Ok(result) => ChatEvent::Completed {
            request_id,
            result: result.clone(),
        },
        Err(error) => ChatEvent::Error {
            request_id,
            error: error.clone(),
        },
    };
    if tx.send(terminal).await.is_err() {
        debug!(%request_id, "chat stream receiver dropped before terminal event");
    }
    let _ = final_tx.send(result);
}
