//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};

/// URL shortener backend: user accounts and authentication API
#[derive(Parser)]
#[command(name = "url-shortener")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (default)
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Create an admin account
    CreateAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

pub use commands::*;
