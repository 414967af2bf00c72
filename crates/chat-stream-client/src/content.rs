/// Answer text used when the non-streaming endpoint returns no `answer`.
pub const NO_ANSWER: &str = "(no answer)";

/// Request body shared by both chat endpoints.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// Final outcome of a chat exchange.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamOutcome {
    /// Full answer text.
    pub full_text: String,
    /// Payload of the last `done` event, when the stream sent one.
    pub terminal_payload: Option<serde_json::Value>,
}

/// Which request produced a `ChatResult`. Diagnostic only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// The SSE stream completed normally.
    Streaming,
    /// The stream failed and the JSON endpoint answered instead.
    Fallback,
}

/// Value returned by `ChatClient::send`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatResult {
    pub outcome: StreamOutcome,
    pub source: ResultSource,
}

impl ChatResult {
    /// Full answer text regardless of the path taken.
    pub fn text(&self) -> &str {
        &self.outcome.full_text
    }
}

/// Success body of the non-streaming endpoint.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub(crate) struct JsonAnswer {
    #[serde(default)]
    pub answer: Option<serde_json::Value>,
}

impl JsonAnswer {
    pub fn into_outcome(self) -> StreamOutcome {
        let full_text = match self.answer {
            Some(serde_json::Value::String(text)) if !text.is_empty() => text,
            _ => NO_ANSWER.to_string(),
        };
        StreamOutcome {
            full_text,
            terminal_payload: None,
        }
    }
}

/// Response of the service health route.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub engine: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(body: serde_json::Value) -> StreamOutcome {
        serde_json::from_value::<JsonAnswer>(body)
            .expect("deserialize")
            .into_outcome()
    }

    #[test]
    fn answer_becomes_full_text_without_terminal_payload() {
        let out = outcome(serde_json::json!({"answer":"fine","sources":[],"meta":{"top_k":3}}));
        assert_eq!(out.full_text, "fine");
        assert_eq!(out.terminal_payload, None);
    }

    #[test]
    fn missing_empty_or_non_string_answer_uses_sentinel() {
        assert_eq!(outcome(serde_json::json!({})).full_text, NO_ANSWER);
        assert_eq!(outcome(serde_json::json!({"answer":""})).full_text, NO_ANSWER);
        assert_eq!(outcome(serde_json::json!({"answer":null})).full_text, NO_ANSWER);
        assert_eq!(outcome(serde_json::json!({"answer":42})).full_text, NO_ANSWER);
    }

    #[test]
    fn result_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ResultSource::Fallback).expect("serialize"),
            serde_json::json!("fallback")
        );
    }
}
