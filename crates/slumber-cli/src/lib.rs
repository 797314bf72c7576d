//! Sleep timeline CLI library.
//!
//! This crate provides the CLI interface for the reconciliation engine.

mod cli;
pub mod commands;
mod config;
pub mod input;

pub use cli::{Cli, Commands};
pub use config::Config;
