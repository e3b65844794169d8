//! Optional server-sent events connection.
//!
//! Compiled with the `streaming` cargo feature and only connects when the
//! runtime flag passed to [`StreamClient::new`] is on. Messages are handed to a
//! [`StreamHandler`] verbatim; there is no reconnection policy.

pub mod client;
pub mod sse;

pub use client::{StreamClient, StreamError, StreamHandler};
pub use sse::{SseDecoder, StreamMessage};
