//! Credential handling for the transport client.
//!
//! This module provides:
//! - `Credential`: the bearer token with its structural check
//! - `CredentialManager`: the shared credential slot and single-flighted refresh
//! - `TokenSource`: where refreshed tokens come from (the auth endpoint)
//! - `TokenStore`: where the current token is persisted between runs

pub mod credential;
pub mod manager;
pub mod source;
pub mod store;

pub use credential::{is_structurally_valid, Credential};
pub use manager::CredentialManager;
pub use source::{Login, TokenSource, TransportTokenSource};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
