use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub mod direct;
pub mod srt;
pub mod subtitle_tool;

use crate::config::SourceConfig;
use crate::Result;

/// Caption tracks the service accepts, in order of preference
pub const PREFERRED_TRACKS: [CaptionTrack; 2] = [CaptionTrack::AutoPortuguese, CaptionTrack::English];

/// A caption track identified by language and origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptionTrack {
    /// Auto-generated (speech recognition) Portuguese
    AutoPortuguese,
    /// Uploaded English captions
    English,
}

impl CaptionTrack {
    /// Track code as YouTube reports it once the leading dot of `vssId` is dropped
    pub fn code(&self) -> &'static str {
        match self {
            CaptionTrack::AutoPortuguese => "a.pt",
            CaptionTrack::English => "en",
        }
    }

    pub fn language(&self) -> &'static str {
        match self {
            CaptionTrack::AutoPortuguese => "pt",
            CaptionTrack::English => "en",
        }
    }

    pub fn is_auto_generated(&self) -> bool {
        matches!(self, CaptionTrack::AutoPortuguese)
    }

    /// Pick the most preferred track among the available track codes
    pub fn select<'a, I>(available: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available: Vec<&str> = available.into_iter().collect();
        PREFERRED_TRACKS
            .into_iter()
            .find(|track| available.contains(&track.code()))
    }
}

impl std::fmt::Display for CaptionTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Metadata attached to the uploaded transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub author: String,
    pub video_id: String,
    pub channel_id: String,
    pub publish_date: Option<NaiveDateTime>,
    pub description: String,
    pub keywords: Vec<String>,
    /// URL the captions were requested for
    pub url: String,
}

impl VideoMetadata {
    /// Flatten into string pairs suitable for object metadata
    pub fn to_object_metadata(&self) -> BTreeMap<String, String> {
        let publish_date = self
            .publish_date
            .map(|date| date.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let keywords = serde_json::to_string(&self.keywords).unwrap_or_else(|_| "[]".to_string());

        BTreeMap::from([
            ("title".to_string(), self.title.clone()),
            ("author".to_string(), self.author.clone()),
            ("video_id".to_string(), self.video_id.clone()),
            ("channel_id".to_string(), self.channel_id.clone()),
            ("publish_date".to_string(), publish_date),
            ("description".to_string(), self.description.clone()),
            ("keywords".to_string(), keywords),
            ("url".to_string(), self.url.clone()),
        ])
    }
}

/// Result of asking a source for captions
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionFetch {
    /// A preferred track exists; `raw_subtitles` is SubRip text
    Found {
        raw_subtitles: String,
        track: CaptionTrack,
        metadata: VideoMetadata,
    },
    /// Neither auto-generated Portuguese nor English captions exist
    NoCaptions,
}

/// Which retrieval mechanism backs the [`CaptionSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSourceKind {
    /// Query the YouTube player API directly
    Direct,
    /// Delegate to the yt-dlp subtitle extractor
    SubtitleTool,
}

impl std::fmt::Display for CaptionSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptionSourceKind::Direct => write!(f, "direct"),
            CaptionSourceKind::SubtitleTool => write!(f, "subtitle_tool"),
        }
    }
}

/// Capability for retrieving captions and metadata for a video URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch raw SubRip captions for the most preferred track
    async fn fetch_captions(&self, url: &str) -> Result<CaptionFetch>;

    /// Short name used in logs and health output
    fn name(&self) -> &'static str;
}

/// Build the caption source selected by configuration
pub fn build_caption_source(config: &SourceConfig, work_dir: &Path) -> Result<Box<dyn CaptionSource>> {
    let source: Box<dyn CaptionSource> = match config.kind {
        CaptionSourceKind::Direct => Box::new(direct::DirectCaptionFetch::new(config)?),
        CaptionSourceKind::SubtitleTool => Box::new(subtitle_tool::SubtitleToolFetch::new(
            config.yt_dlp_path.clone(),
            work_dir.to_path_buf(),
        )),
    };

    tracing::info!("Using caption source: {}", source.name());
    Ok(source)
}

/// Parse the publish dates reported by YouTube and yt-dlp.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` and `YYYYMMDD`.
pub fn parse_publish_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.naive_local());
    }

    ["%Y-%m-%d", "%Y%m%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
