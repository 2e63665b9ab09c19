use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caption_uploader::captions::{build_caption_source, CaptionSourceKind};
use caption_uploader::cli::{Cli, Commands};
use caption_uploader::config::Config;
use caption_uploader::pipeline::{CaptionPipeline, UploadOutcome};
use caption_uploader::server::{self, AppState};
use caption_uploader::storage::build_object_store;
use caption_uploader::{normalizer, output, utils};

fn init_tracing(verbose: bool, log_format: &str) {
    let default_filter = if verbose {
        "caption_uploader=debug"
    } else {
        "caption_uploader=info"
    };

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()),
    );

    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn build_pipeline(config: &Config) -> Result<CaptionPipeline> {
    let temp_dir = config.temp_dir();
    let source = build_caption_source(&config.source, &temp_dir)?;
    let store = build_object_store(&config.storage).await?;

    Ok(CaptionPipeline::new(
        source,
        store,
        config.storage.key_prefix.clone(),
        temp_dir,
    ))
}

/// Clean a local subtitle file; needs no configuration
fn clean_file(input: &Path, output: Option<&Path>) -> Result<()> {
    let raw = fs_err::read_to_string(input)?;
    let cleaned = normalizer::clean_subtitles(&raw);

    match output {
        Some(path) => {
            fs_err::write(path, cleaned)?;
            println!("Transcript saved to: {}", path.display());
        }
        None => println!("{}", cleaned),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Clean { input, output } = &cli.command {
        return clean_file(input, output.as_deref());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().await?,
    };
    if let Some(kind) = cli.source {
        config.source.kind = kind;
    }

    init_tracing(cli.verbose, &config.app.log_format);

    match cli.command {
        Commands::Serve { host, port } => {
            if config.source.kind == CaptionSourceKind::SubtitleTool {
                // Non-fatal: the tools may be installed after startup in containers
                for dep in utils::check_dependencies(&config.source.yt_dlp_path).await {
                    tracing::warn!("Missing dependency: {}", dep);
                }
            }

            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("Invalid listen address: {}:{}", host, port))?;

            let pipeline = build_pipeline(&config).await?;
            let state = Arc::new(AppState { pipeline });

            server::serve(state, addr).await?;
        }
        Commands::Fetch {
            url,
            bucket,
            output,
            format,
        } => {
            let pipeline = build_pipeline(&config).await?;

            let progress = ProgressBar::new_spinner();
            progress.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            progress.enable_steady_tick(Duration::from_millis(100));

            match bucket {
                Some(bucket) => {
                    progress.set_message("Fetching and uploading captions...");
                    let outcome = pipeline.convert_and_upload(&url, &bucket).await;
                    progress.finish_and_clear();

                    match outcome? {
                        UploadOutcome::Uploaded { storage_path, lines, .. } => {
                            println!("Uploaded {} lines to: {}", lines, storage_path);
                        }
                        UploadOutcome::NoCaptions => println!("{}", server::NO_CAPTIONS_MESSAGE),
                    }
                }
                None => {
                    progress.set_message("Fetching captions...");
                    let transcript = pipeline.fetch_transcript(&url).await;
                    progress.finish_and_clear();

                    match (transcript?, output) {
                        (Some(transcript), Some(path)) => {
                            output::save_to_file(&transcript, &path, &format).await?;
                            println!("Transcript saved to: {}", path.display());
                        }
                        (Some(transcript), None) => output::print_to_console(&transcript, &format)?,
                        (None, _) => println!("{}", server::NO_CAPTIONS_MESSAGE),
                    }
                }
            }
        }
        Commands::Clean { input, output } => clean_file(&input, output.as_deref())?,
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                config.save_to(&path)?;
                println!("Configuration written to: {}", path.display());
            }
        }
    }

    Ok(())
}
