//! Shared types for the calnotes application.
//!
//! This module contains the crate-wide Result alias and the CLI subcommands.
use clap::Subcommand;

use crate::NotesError;

/// A specialized Result type for calnotes operations.
pub type Result<T> = std::result::Result<T, NotesError>;

/// Available subcommands for the calnotes application
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Address to bind, e.g. 127.0.0.1:3001 (overrides configuration)
        #[clap(short, long)]
        bind: Option<String>,
    },

    /// Show storage, calendar and LLM integration status
    Status,

    /// List stored notes
    List {
        /// Only show notes in this category
        #[clap(short, long)]
        category: Option<String>,

        /// Limit the number of notes returned
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },
}
