//! Command-line interface for gridhunt.

use clap::{Parser, Subcommand};

use crate::session::GridConfig;

/// Grid Hunter - hidden-position duel over a shared realtime store
#[derive(Parser, Debug)]
#[command(name = "gridhunt")]
#[command(about = "Two-player hidden-position guessing game", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host the shared store relay both players connect to
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7070")]
        bind: String,
    },

    /// Run the terminal game client
    Play {
        /// Relay address to connect to
        #[arg(long, default_value = "127.0.0.1:7070")]
        server: String,

        /// Display name (asked interactively if omitted)
        #[arg(long)]
        name: Option<String>,

        /// Grid dimension N for an N×N board
        #[arg(long, default_value_t = GridConfig::DEFAULT_SIZE)]
        grid_size: u8,
    },
}
