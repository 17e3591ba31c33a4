//! CLI module
//!
//! Command-line interface for the custom resource.
//!
//! # Commands
//!
//! - `handle` - Process one lifecycle event
//! - `rotate` - Process one secret rotation step
//! - `validate` - Validate resource properties offline

mod commands;
mod runner;

pub use commands::{Cli, Commands, SchemaKind};
pub use runner::Runner;
