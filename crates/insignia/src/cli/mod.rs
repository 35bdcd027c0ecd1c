//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the insignia binary.

mod commands;
mod daemon;
mod media;

pub use commands::{Cli, Commands, OutputFormat};
pub use daemon::{run_migrations, serve, sweep};
pub use media::{delete_media, retrieve_media, store_media};
