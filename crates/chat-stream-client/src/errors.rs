/// Errors raised by the frame decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The undelimited remainder grew past the configured bound.
    #[error("frame buffer exceeded {limit} bytes without a frame delimiter")]
    TooLarge { limit: usize },
}

/// Top-level error type for the public client API.
///
/// Streaming failures of any kind other than `Cancelled` are recovered by
/// the fallback request; the variant returned to the caller is the one
/// produced by whichever path ran last.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Network or connection failure (including a failed body read).
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Endpoint answered with a non-2xx status.
    #[error("http error ({status}): {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<String>,
    },
    /// Server sent an `error` event on the stream.
    #[error("protocol error: {message}")]
    Protocol { message: String },
    /// Decode buffer limit reached before a frame delimiter arrived.
    #[error("frame buffer exceeded {limit} bytes without a frame delimiter")]
    FrameTooLarge { limit: usize },
    /// The caller abandoned the request.
    #[error("cancelled")]
    Cancelled,
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
}

impl ChatError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>, body: Option<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body,
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the human-readable reason without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Transport { message }
            | Self::Http { message, .. }
            | Self::Protocol { message } => message.clone(),
            Self::Config(message) | Self::Validation(message) => message.clone(),
            Self::FrameTooLarge { .. } | Self::Cancelled => self.to_string(),
        }
    }

    /// Returns the HTTP status code for `Http` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the streaming path may be superseded by the fallback request.
    pub(crate) fn allows_fallback(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Validation(_) | Self::Config(_))
    }
}

impl From<FrameError> for ChatError {
    fn from(value: FrameError) -> Self {
        match value {
            FrameError::TooLarge { limit } => Self::FrameTooLarge { limit },
        }
    }
}
