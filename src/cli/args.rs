//! CLI argument definitions.
//!
//! Commands:
//! - yamanaka-server init --config <path>
//! - yamanaka-server serve --config <path>
//! - yamanaka-server snapshot --config <path>

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "yamanaka-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the vault root directory if it doesn't already exist.
    Init {
        #[arg(long, default_value = "./yamanaka.json")]
        config: PathBuf,
    },

    /// Start the sync server and serve until terminated.
    Serve {
        #[arg(long, default_value = "./yamanaka.json")]
        config: PathBuf,
    },

    /// Commit one history snapshot of the current vault state and exit.
    Snapshot {
        #[arg(long, default_value = "./yamanaka.json")]
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
