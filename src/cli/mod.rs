//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction};
pub use commands::{
    convert, generate, handle_auth_action, handle_config_action, list_videos, run,
    test_connection,
};
