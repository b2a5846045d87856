use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "datachat")]
#[command(
    about = "Ask questions about a CSV file and get answers or charts",
    long_about = "Ask questions about a CSV file and get answers or charts\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default probe path when --config is not provided:\n    1. $XDG_CONFIG_HOME/datachat/config.toml\n    2. ~/.config/datachat/config.toml\n\nEnvironment (also read from .env): OPENAI_API_KEY, MODEL_NAME, OPENAI_BASE_URL, DATASET_PATH"
)]
pub struct CliArgs {
    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// CSV file to analyse. Overrides DATASET_PATH and the config file.
    #[arg(long, value_name = "PATH")]
    pub dataset: Option<PathBuf>,

    /// Answer a single question, print the result and exit.
    #[arg(long, value_name = "QUESTION")]
    pub ask: Option<String>,

    /// Log redacted model-service HTTP traffic to stderr.
    #[arg(long)]
    pub http_debug: bool,

    /// Initialize the embedded Python interpreter and exit.
    #[arg(long)]
    pub smoke_python: bool,
}
