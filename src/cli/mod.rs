//! CLI module for streamprint - command-line arguments and overrides.
//!
//! Provides the single entry point that feeds an input file (or stdin)
//! through the printer.

pub mod commands;

pub use commands::Cli;
