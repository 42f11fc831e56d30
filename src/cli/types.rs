//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "polity")]
#[command(about = "Polity - consistency and identity tooling for governance games", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .polity/config.yaml + .polity/local.yaml)
    #[arg(short, long, global = true, env = "POLITY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed snapshot for the local peer (overrides store.seed_path)
    #[arg(short, long, global = true)]
    pub seed: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a game with its actors, cards and agreements
    Context {
        /// Game ID
        game: String,
        /// Bypass the entity cache for the game record
        #[arg(long)]
        refresh: bool,
    },

    /// Resolve the actor a user plays in a game
    Whoami {
        /// Game ID
        game: String,
        /// User ID
        user: String,
    },

    /// Point a user's identity mapping at an actor
    Repair {
        /// Game ID
        game: String,
        /// User ID
        user: String,
        /// Actor ID
        actor: String,
    },

    /// Join a game with a card, creating the user's actor if needed
    Join {
        /// Game ID
        game: String,
        /// User ID
        user: String,
        /// Card the new actor plays
        #[arg(long)]
        card: String,
        /// Actor display name (defaults to the card title)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print every new version of a game record
    Watch {
        /// Game ID
        game: String,
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}
