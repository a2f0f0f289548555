pub mod bridge;
pub mod cancellation;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod harness;
pub mod io_log;
pub mod plugin;
pub mod query;
pub mod sandbox;
pub mod terminal;
pub mod types;

#[cfg(test)]
pub mod test_helpers;

// Re-export main types
pub use types::*;

// Re-export the session API for convenience
pub use error::RunError;
pub use plugin::{InterpreterPlugin, PluginRegistry};
pub use sandbox::{RunAttempt, Sandbox};
