//! Commands
//!
//! Entry points behind the `llama-stream` subcommands.

pub mod download;
pub mod prompt;
pub mod run;
