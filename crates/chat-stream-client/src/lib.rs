//! Client for a token-streaming chat service.
//!
//! A question is posted to the SSE streaming endpoint; `token` deltas are
//! handed to the caller as they arrive. If the stream fails for any reason
//! other than cancellation, the same question is sent once to the
//! non-streaming endpoint and its answer is returned in the same shape.
//!
//! # Callback usage
//!
//! ```no_run
//! use chat_stream_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::new(ClientConfig::new("http://localhost:8000"))?;
//! let result = client
//!     .send("What are the office hours?", |delta: &str| print!("{delta}"))
//!     .await?;
//! println!();
//! assert_eq!(result.text(), result.outcome.full_text);
//! # Ok(())
//! # }
//! ```
//!
//! # Channel usage
//!
//! ```no_run
//! use chat_stream_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::from_env()?;
//! let mut stream = client.start_stream("Summarize the handbook").await?;
//! while let Some(event) = stream.next_event().await {
//!     match event {
//!         ChatEvent::Delta { text, .. } => print!("{text}"),
//!         ChatEvent::FallbackStarted { .. } => println!("\n(retrying without streaming)"),
//!         ChatEvent::Completed { .. } | ChatEvent::Error { .. } => break,
//!         ChatEvent::Started { .. } => {}
//!     }
//! }
//! let result = stream.finish().await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

/// Client entry point.
pub mod client;
/// Client configuration.
pub mod config;
/// Request, outcome, and result types.
pub mod content;
/// Public error types.
pub mod errors;
/// Fallback orchestration and the non-streaming request.
mod fallback;
/// Incremental SSE frame decoder.
pub mod frame;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Streaming session over the SSE endpoint.
pub mod session;
/// Token delivery seam.
pub mod sink;
/// Channel-based handle, events, and cancellation.
pub mod stream;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use content::{ChatResult, HealthStatus, NO_ANSWER, ResultSource, StreamOutcome};
pub use errors::{ChatError, FrameError};
pub use frame::{Decoded, Frame, FrameDecoder, decode};
pub use sink::{CallbackSink, TokenSink};
pub use stream::{AbortHandle, ChatEvent, ChatStream};
