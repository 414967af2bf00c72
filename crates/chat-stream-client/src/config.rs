use std::time::Duration;

use crate::errors::ChatError;
use crate::frame::DEFAULT_MAX_BUFFER_BYTES;

/// Configuration for the chat client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat service (scheme, host, optional port).
    pub base_url: String,
    /// Path of the SSE streaming endpoint.
    pub stream_path: String,
    /// Path of the non-streaming JSON endpoint.
    pub json_path: String,
    /// Upper bound for undelimited stream input held by the frame decoder.
    pub max_buffer_bytes: usize,
    /// Bounded event buffer size used by `ChatStream`.
    pub stream_buffer_capacity: usize,
    /// Optional TCP connect timeout.
    ///
    /// No whole-request timeout is applied; use an `AbortHandle` instead.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            stream_path: "/api/chat/stream".to_string(),
            json_path: "/api/chat".to_string(),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            stream_buffer_capacity: 64,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Creates a config pointing at `base_url` with default paths.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `CHAT_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ChatError> {
        let mut config = Self::default();
        if let Some(url) = lookup("CHAT_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(path) = lookup("CHAT_STREAM_PATH") {
            config.stream_path = path.trim().to_string();
        }
        if let Some(path) = lookup("CHAT_JSON_PATH") {
            config.json_path = path.trim().to_string();
        }
        if let Some(raw) = lookup("CHAT_MAX_BUFFER_BYTES") {
            config.max_buffer_bytes = raw.trim().parse().map_err(|e| {
                ChatError::Config(format!("invalid CHAT_MAX_BUFFER_BYTES {raw:?}: {e}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the streaming endpoint path.
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Overrides the non-streaming endpoint path.
    pub fn json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = path.into();
        self
    }

    /// Overrides the decode buffer bound.
    pub fn max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_buffer_bytes = bytes;
        self
    }

    /// Overrides the `ChatStream` channel capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Sets a TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Checks the config for values the client cannot work with.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url must not be empty".into()));
        }
        for (name, path) in [
            ("stream_path", &self.stream_path),
            ("json_path", &self.json_path),
        ] {
            if !path.starts_with('/') {
                return Err(ChatError::Config(format!(
                    "{name} must start with '/', got {path:?}"
                )));
            }
        }
        if self.max_buffer_bytes == 0 {
            return Err(ChatError::Config(
                "max_buffer_bytes must be greater than 0".into(),
            ));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ChatError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        self.url(&self.stream_path)
    }

    pub(crate) fn json_url(&self) -> String {
        self.url(&self.json_path)
    }

    pub(crate) fn health_url(&self) -> String {
        self.url("/")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
