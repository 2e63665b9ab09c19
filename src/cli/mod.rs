use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::captions::CaptionSourceKind;

#[derive(Parser)]
#[command(
    name = "caption-uploader",
    about = "Caption Uploader - Fetch YouTube captions, clean them and store them in GCS or S3",
    version,
    long_about = "Fetches auto-generated Portuguese or English captions for a YouTube video, strips timestamps, indices and repeated lines, and uploads the transcript with the video metadata to cloud object storage. Runs as an HTTP service or as a one-shot command."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, env = "CAPTION_UPLOADER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the configured caption source
    #[arg(long, global = true, value_enum, env = "CAPTION_UPLOADER_SOURCE")]
    pub source: Option<CaptionSourceKind>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind (overrides config)
        #[arg(long, env = "CAPTION_UPLOADER_HOST")]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Fetch and clean the captions of one video
    Fetch {
        /// YouTube video URL
        #[arg(value_name = "URL")]
        url: String,

        /// Upload the transcript to this bucket instead of printing it
        #[arg(short, long, value_name = "BUCKET")]
        bucket: Option<String>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE", conflicts_with = "bucket")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text", conflicts_with = "bucket")]
        format: OutputFormat,
    },

    /// Clean a local SubRip file
    Clean {
        /// Subtitle file to clean
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show or initialise the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with track and metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
