use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

use super::{parse_publish_date, CaptionFetch, CaptionSource, CaptionTrack, VideoMetadata};
use crate::{utils, Result};

/// Caption source backed by the yt-dlp subtitle extractor
pub struct SubtitleToolFetch {
    yt_dlp_path: String,
    work_dir: PathBuf,
}

impl SubtitleToolFetch {
    pub fn new(yt_dlp_path: String, work_dir: PathBuf) -> Self {
        Self {
            yt_dlp_path,
            work_dir,
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Get video information, including the available subtitle maps
    async fn get_video_info(&self, url: &str) -> Result<Value> {
        tracing::debug!("Extracting video info for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--no-playlist", "--skip-download", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let json_str = String::from_utf8(output.stdout)?;
        let info: Value = serde_json::from_str(&json_str).context("Failed to parse yt-dlp output")?;

        Ok(info)
    }

    /// Have yt-dlp write the track as SubRip into the work directory and read it back
    async fn download_subtitles(&self, url: &str, track: CaptionTrack, video_id: &str) -> Result<String> {
        let stem = format!("{}-{}", video_id, &Uuid::new_v4().to_string()[..8]);
        let template = self
            .work_dir
            .join(format!("{}.%(ext)s", stem))
            .to_string_lossy()
            .into_owned();
        let write_flag = if track.is_auto_generated() {
            "--write-auto-subs"
        } else {
            "--write-subs"
        };

        tracing::debug!("Downloading {} subtitles for: {}", track, url);

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--skip-download",
                write_flag,
                "--sub-langs",
                track.language(),
                "--sub-format",
                "srt/vtt/best",
                "--convert-subs",
                "srt",
                "--no-playlist",
                "--output",
                template.as_str(),
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to download subtitles: {}", error.trim());
        }

        let subtitle_path = subtitle_file_path(&self.work_dir, &stem, track);
        let raw = fs_err::read_to_string(&subtitle_path)
            .context("yt-dlp did not produce a subtitle file")?;

        if let Err(e) = fs_err::remove_file(&subtitle_path) {
            tracing::warn!("Failed to remove subtitle file: {}", e);
        }

        Ok(raw)
    }
}

/// Path yt-dlp writes a converted subtitle to: `<stem>.<lang>.srt`
fn subtitle_file_path(work_dir: &Path, stem: &str, track: CaptionTrack) -> PathBuf {
    work_dir.join(format!("{}.{}.srt", stem, track.language()))
}

/// Pick a preferred track from yt-dlp's `automatic_captions` and `subtitles` maps
fn select_track(info: &Value) -> Option<CaptionTrack> {
    let has_entries = |map: &str, lang: &str| {
        info[map][lang]
            .as_array()
            .map(|formats| !formats.is_empty())
            .unwrap_or(false)
    };

    let mut available = Vec::new();
    if has_entries("automatic_captions", "pt") {
        available.push(CaptionTrack::AutoPortuguese.code());
    }
    if has_entries("subtitles", "en") {
        available.push(CaptionTrack::English.code());
    }

    CaptionTrack::select(available)
}

fn metadata_from_info(info: &Value, url: &str) -> VideoMetadata {
    let text = |key: &str| info[key].as_str().unwrap_or_default().to_string();

    let publish_date = info["timestamp"]
        .as_i64()
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.naive_utc())
        .or_else(|| info["upload_date"].as_str().and_then(parse_publish_date));

    let keywords = info["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let author = info["uploader"]
        .as_str()
        .or_else(|| info["channel"].as_str())
        .unwrap_or_default()
        .to_string();

    VideoMetadata {
        title: text("title"),
        author,
        video_id: utils::sanitize_filename_component(&text("id")),
        channel_id: text("channel_id"),
        publish_date,
        description: text("description"),
        keywords,
        url: url.to_string(),
    }
}

#[async_trait]
impl CaptionSource for SubtitleToolFetch {
    async fn fetch_captions(&self, url: &str) -> Result<CaptionFetch> {
        if !self.check_availability().await {
            anyhow::bail!("yt-dlp is not available. Please install it: https://github.com/yt-dlp/yt-dlp");
        }

        let info = self.get_video_info(url).await?;
        let metadata = metadata_from_info(&info, url);

        let Some(track) = select_track(&info) else {
            tracing::info!("No preferred caption track for {}", metadata.video_id);
            return Ok(CaptionFetch::NoCaptions);
        };

        let raw_subtitles = self.download_subtitles(url, track, &metadata.video_id).await?;

        tracing::info!("Captions downloaded for video: {} ({})", metadata.title, track);

        Ok(CaptionFetch::Found {
            raw_subtitles,
            track,
            metadata,
        })
    }

    fn name(&self) -> &'static str {
        "subtitle_tool"
    }
}
