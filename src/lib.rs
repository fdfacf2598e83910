#![deny(clippy::all)]

//! sirseer-relay — a one-shot extractor of pull request history from a
//! GitHub-compatible GraphQL hosting service.
//!
//! The crate is organized around the fetch engine: a paginated GraphQL
//! client with adaptive batch sizing, a retry and rate-limit controller, a
//! resumable checkpointing state machine, and a durable NDJSON output
//! pipeline. The CLI binary (`src/main.rs`) is a thin shell over [`engine`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;

pub use errors::{RelayError, Result};
