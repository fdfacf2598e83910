//! Command-line surface.
//!
//! The parser itself is a thin `clap` shell; the real work happens in
//! [`crate::engine`]. `--help`/`--version` are handled by clap's built-ins.

pub mod args;

pub use args::{Cli, Command, FetchArgs};
