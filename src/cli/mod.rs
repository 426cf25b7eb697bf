//! Command-line interface of the provider binary.
//!
//! `serve` speaks the JSON-lines protocol on stdio; the other commands run
//! single requests or offline checks for debugging.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
