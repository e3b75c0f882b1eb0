//! Meshlink Matrix - Matrix room collaborator for the bridge
//!
//! A thin client over the Matrix client-server HTTP API covering exactly the
//! bridge's needs: login (password or token), room alias resolution, posting
//! and editing messages with HTML bodies, display-name lookup, and a sync
//! loop that reduces room traffic to [`MatrixEvent`] values on a channel.
//!
//! End-to-end encrypted rooms are out of scope; the bridge posts cleartext.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod event;
pub mod room;

pub use client::{HttpMatrixClient, MatrixConfig};
pub use error::{MatrixError, Result};
pub use event::MatrixEvent;
pub use room::MatrixRoom;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
