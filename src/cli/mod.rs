//! Command-line entry point: argument parsing, configuration loading,
//! and the `init` / `serve` / `snapshot` subcommands.

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, Command};
pub use commands::{init, run, run_command, serve, snapshot};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
