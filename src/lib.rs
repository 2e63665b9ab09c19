//! Caption Uploader - fetches YouTube captions, cleans them and stores them in object storage
//!
//! Captions are retrieved through a [`CaptionSource`] (the YouTube player API or the
//! `yt-dlp` subtitle tool), normalized into plain text by [`normalizer`], and written
//! together with the video metadata to an [`ObjectStore`] (Google Cloud Storage or S3).
//! The [`server`] module exposes the whole flow over HTTP.

pub mod captions;
pub mod cli;
pub mod config;
pub mod normalizer;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod utils;

pub use captions::{CaptionFetch, CaptionSource, CaptionTrack, VideoMetadata};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use pipeline::{CaptionPipeline, UploadOutcome};
pub use storage::{ObjectStore, PutObjectRequest};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failures surfaced to callers of the pipeline and the HTTP layer.
///
/// A video without a usable caption track is not an error; see
/// [`UploadOutcome::NoCaptions`].
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Error downloading video: {0}")]
    SourceUnavailable(String),

    #[error("Error uploading captions: {0}")]
    SinkWriteFailure(String),

    #[error("Temporary file operation failed: {0}")]
    Spool(String),
}
