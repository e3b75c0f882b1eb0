//! Meshlink State - Persistence for the Meshtastic-Matrix bridge
//!
//! SQLite-backed storage (via sqlx) for the two things that must survive a
//! restart: the NODEINFO-derived name directory and the per-packet message
//! state snapshots that let observations after a restart keep editing the
//! same Matrix events.

#![warn(missing_docs)]

pub mod error;
pub mod store;

pub use error::{Result, StateError};
pub use store::SqliteStore;
