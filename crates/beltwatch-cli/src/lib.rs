//! Beltwatch CLI library
//!
//! Configuration, command handling and terminal I/O for the `beltwatch`
//! binary.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod terminal;

pub use app::{BeltwatchApp, RunningSession};
pub use cli::{Cli, Commands};
pub use config::BeltwatchConfig;
pub use error::{CliError, Result};
