use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::captions::{CaptionFetch, CaptionSource, CaptionTrack, VideoMetadata};
use crate::normalizer;
use crate::storage::{
    transcript_key, validate_bucket_name, ObjectStore, PutObjectRequest, TRANSCRIPT_CONTENT_TYPE,
};
use crate::utils;
use crate::ServiceError;

/// A cleaned transcript together with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub text: String,
    pub track: CaptionTrack,
    pub metadata: VideoMetadata,
}

/// What happened to a convert-and-upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        storage_path: String,
        video_id: String,
        lines: usize,
    },
    NoCaptions,
}

/// Fetch -> normalize -> spool -> upload
pub struct CaptionPipeline {
    source: Box<dyn CaptionSource>,
    store: Box<dyn ObjectStore>,
    key_prefix: String,
    temp_dir: PathBuf,
}

impl CaptionPipeline {
    pub fn new(
        source: Box<dyn CaptionSource>,
        store: Box<dyn ObjectStore>,
        key_prefix: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            store,
            key_prefix: key_prefix.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Fetch captions and clean them, without storing anything
    pub async fn fetch_transcript(&self, url: &str) -> Result<Option<Transcript>, ServiceError> {
        let url = utils::validate_and_normalize_url(url)
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        tracing::info!("Downloading captions for video: {}", url);

        let fetch = self
            .source
            .fetch_captions(&url)
            .await
            .map_err(|e| ServiceError::SourceUnavailable(format!("{:#}", e)))?;

        match fetch {
            CaptionFetch::NoCaptions => Ok(None),
            CaptionFetch::Found {
                raw_subtitles,
                track,
                metadata,
            } => Ok(Some(Transcript {
                text: normalizer::clean_subtitles(&raw_subtitles),
                track,
                metadata,
            })),
        }
    }

    /// Fetch, clean and upload the captions of a video to `bucket`
    pub async fn convert_and_upload(&self, url: &str, bucket: &str) -> Result<UploadOutcome, ServiceError> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(ServiceError::InvalidRequest("bucket name must not be empty".to_string()));
        }
        validate_bucket_name(bucket).map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let Some(transcript) = self.fetch_transcript(url).await? else {
            tracing::info!("No captions found for {}", url);
            return Ok(UploadOutcome::NoCaptions);
        };

        let video_id = transcript.metadata.video_id.clone();
        if video_id.is_empty() {
            return Err(ServiceError::SourceUnavailable(
                "caption source returned no video id".to_string(),
            ));
        }

        let body = {
            let temp_dir = self.temp_dir.clone();
            let video_id = video_id.clone();
            let text = transcript.text.clone();
            tokio::task::spawn_blocking(move || spool(&temp_dir, &video_id, &text))
                .await
                .map_err(|e| ServiceError::Spool(e.to_string()))?
                .map_err(|e| ServiceError::Spool(format!("{:#}", e)))?
        };

        let request = PutObjectRequest {
            bucket: bucket.to_string(),
            key: transcript_key(&self.key_prefix, &video_id),
            body,
            content_type: TRANSCRIPT_CONTENT_TYPE.to_string(),
            metadata: transcript.metadata.to_object_metadata(),
        };

        let storage_path = self
            .store
            .put_object(request)
            .await
            .map_err(|e| ServiceError::SinkWriteFailure(format!("{:#}", e)))?;

        tracing::info!("Uploaded captions for {} to {}", video_id, storage_path);

        Ok(UploadOutcome::Uploaded {
            storage_path,
            video_id,
            lines: line_count(&transcript.text),
        })
    }
}

/// Write the transcript to a temporary file in `temp_dir` and read back the bytes to upload
fn spool(temp_dir: &Path, video_id: &str, text: &str) -> anyhow::Result<Vec<u8>> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}-", video_id))
        .suffix(".txt")
        .tempfile_in(temp_dir)
        .with_context(|| format!("Failed to create spool file in {}", temp_dir.display()))?;

    file.write_all(text.as_bytes())?;
    file.flush()?;

    tracing::debug!("Spooled transcript to {}", file.path().display());
    read_spooled(file.path())
}

fn read_spooled(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs_err::read(path).context("Failed to read spooled transcript")
}

fn line_count(text: &str) -> usize {
    text.lines().count()
}
