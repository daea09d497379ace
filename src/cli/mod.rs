//! CLI module for Stemme.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Stemme - Speech-to-Text Upload Gateway
///
/// Accepts uploaded audio over HTTP, normalizes it with ffmpeg and returns a
/// transcript from Google Cloud Speech-to-Text.
#[derive(Parser, Debug)]
#[command(name = "stemme")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP transcription server
    Serve {
        /// Host to bind to (default: server.host, or $HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default: server.port, or $PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Transcribe a local audio file and print the transcript
    Transcribe {
        /// Path to an audio or video file
        input: String,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
