//! Adapters that live inside the domain crate.
//!
//! The in-memory repository backs unit tests and the `memory` storage
//! provider of the api-server. Durable adapters (SQLite) live in separate
//! crates.

pub mod memory_repo;
