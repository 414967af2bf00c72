use crate::errors::ChatError;

/// Receiver of incremental answer text.
///
/// Deltas are delivered in arrival order, and each call completes before the
/// next network chunk is read. Returning an error stops the exchange; the
/// client treats it as the consumer going away.
#[async_trait::async_trait]
pub trait TokenSink: Send {
    /// Called once per non-empty `token` delta.
    async fn on_token(&mut self, delta: &str) -> Result<(), ChatError>;

    /// Called when the stream failed and the fallback request is about to run.
    ///
    /// Text already delivered through `on_token` is superseded by the
    /// fallback answer.
    async fn on_fallback(&mut self, _reason: &ChatError) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Adapts a plain `FnMut(&str)` callback into a `TokenSink`.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&str) + Send,
{
    /// Wraps `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait::async_trait]
impl<F> TokenSink for CallbackSink<F>
where
    F: FnMut(&str) + Send,
{
    async fn on_token(&mut self, delta: &str) -> Result<(), ChatError> {
        (self.callback)(delta);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records everything it is handed.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub deltas: Vec<String>,
        pub fallbacks: Vec<ChatError>,
    }

    #[async_trait::async_trait]
    impl TokenSink for RecordingSink {
        async fn on_token(&mut self, delta: &str) -> Result<(), ChatError> {
            self.deltas.push(delta.to_string());
            Ok(())
        }

        async fn on_fallback(&mut self, reason: &ChatError) -> Result<(), ChatError> {
            self.fallbacks.push(reason.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn callback_sink_forwards_deltas_in_order() {
        let mut seen = Vec::new();
        {
            let mut sink = CallbackSink::new(|delta: &str| seen.push(delta.to_string()));
            sink.on_token("a").await.expect("token");
            sink.on_token("b").await.expect("token");
            sink.on_fallback(&ChatError::transport("x"))
                .await
                .expect("default hook");
        }
        assert_eq!(seen, vec!["a", "b"]);
    }
}
