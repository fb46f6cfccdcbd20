use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Translation engine (ollama, lexicon); overrides the configuration
    #[arg(short, long)]
    pub engine: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a string, an array, or an object of strings/arrays
    Task {
        /// Input as JSON, e.g. '"Hello"', '["a","b"]' or '{"title":"Hi"}'
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the JSON input from a file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Target language code
        #[arg(short, long)]
        target: String,

        /// Source language code, or "auto" to detect per text
        #[arg(short, long, default_value = "auto")]
        source: String,

        /// Only download models over an unmetered network
        #[arg(long)]
        requires_wifi: bool,

        /// Only download models while charging
        #[arg(long)]
        require_charging: bool,
    },

    /// Translate one text and review it interactively
    Sheet {
        /// Text to translate
        #[arg(short = 'x', long)]
        text: String,

        /// Target language code (defaults to sheet.target_language)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// List supported language codes
    Languages,

    /// Check that the configured engine is usable
    Check,

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "honyaku.toml")]
        output: PathBuf,
    },
}
