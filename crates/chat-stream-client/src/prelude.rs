//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ChatClient, ChatError, ChatEvent, ChatResult, ChatStream, ClientConfig,
    ResultSource, StreamOutcome, TokenSink,
};
