use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::srt::{render_srt, Cue};
use super::{parse_publish_date, CaptionFetch, CaptionSource, CaptionTrack, VideoMetadata};
use crate::config::SourceConfig;
use crate::utils;
use crate::Result;

/// Player API response, limited to the fields used here
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    video_details: Option<VideoDetails>,
    captions: Option<PlayerCaptions>,
    microformat: Option<Microformat>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    video_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerCaptions {
    player_captions_tracklist_renderer: TracklistRenderer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<TrackInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackInfo {
    base_url: String,
    language_code: String,
    kind: Option<String>,
    vss_id: Option<String>,
}

impl TrackInfo {
    /// `vssId` without its leading dot, or rebuilt from kind and language
    fn code(&self) -> String {
        match &self.vss_id {
            Some(vss_id) => vss_id.trim_start_matches('.').to_string(),
            None if self.kind.as_deref() == Some("asr") => format!("a.{}", self.language_code),
            None => self.language_code.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Microformat {
    player_microformat_renderer: Option<MicroformatRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MicroformatRenderer {
    publish_date: Option<String>,
}

/// `fmt=json3` timed text document
#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedTextEvent {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    segs: Option<Vec<TimedTextSegment>>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSegment {
    #[serde(default)]
    utf8: String,
}

/// Caption source that talks to the YouTube player API with a single client identity
pub struct DirectCaptionFetch {
    client: Client,
    base_url: String,
    client_name: String,
    client_version: String,
}

impl DirectCaptionFetch {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(format!(
                "com.google.android.youtube/{} (Linux; U; Android 11) gzip",
                config.client_version
            ))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.youtube_base_url.trim_end_matches('/').to_string(),
            client_name: config.client_name.clone(),
            client_version: config.client_version.clone(),
        })
    }

    /// Query the player endpoint for a video
    async fn get_player_response(&self, video_id: &str) -> Result<PlayerResponse> {
        tracing::debug!("Requesting player response for video: {}", video_id);

        let body = json!({
            "context": {
                "client": {
                    "clientName": self.client_name,
                    "clientVersion": self.client_version,
                    "androidSdkVersion": 30,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let response = self
            .client
            .post(format!("{}/youtubei/v1/player?prettyPrint=false", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Player request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Player request failed: HTTP {}", response.status());
        }

        let player: PlayerResponse = response
            .json()
            .await
            .context("Failed to parse player response")?;

        if let Some(status) = &player.playability_status {
            if status.status != "OK" {
                anyhow::bail!(
                    "Video is not playable ({}): {}",
                    status.status,
                    status.reason.as_deref().unwrap_or("no reason given")
                );
            }
        }

        Ok(player)
    }

    /// Download a caption track and render it as SubRip text
    async fn download_track(&self, track: &TrackInfo) -> Result<String> {
        tracing::debug!("Downloading caption track: {}", track.code());

        let response = self
            .client
            .get(&track.base_url)
            .query(&[("fmt", "json3")])
            .send()
            .await
            .context("Caption track request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download captions: HTTP {}", response.status());
        }

        let timed_text: TimedText = response
            .json()
            .await
            .context("Failed to parse caption track")?;

        Ok(render_srt(&timed_text_to_cues(timed_text)))
    }
}

fn timed_text_to_cues(timed_text: TimedText) -> Vec<Cue> {
    timed_text
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs?.into_iter().map(|seg| seg.utf8).collect();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }

            Some(Cue {
                start_ms: event.t_start_ms,
                end_ms: event.t_start_ms.saturating_add(event.d_duration_ms),
                text: text.to_string(),
            })
        })
        .collect()
}

fn metadata_from_player(player: &PlayerResponse, video_id: &str, url: &str) -> VideoMetadata {
    let publish_date = player
        .microformat
        .as_ref()
        .and_then(|m| m.player_microformat_renderer.as_ref())
        .and_then(|r| r.publish_date.as_deref())
        .and_then(parse_publish_date);

    match &player.video_details {
        Some(details) => VideoMetadata {
            title: details.title.clone(),
            author: details.author.clone(),
            video_id: utils::sanitize_filename_component(&details.video_id),
            channel_id: details.channel_id.clone(),
            publish_date,
            description: details.short_description.clone(),
            keywords: details.keywords.clone(),
            url: url.to_string(),
        },
        None => VideoMetadata {
            video_id: video_id.to_string(),
            publish_date,
            url: url.to_string(),
            ..Default::default()
        },
    }
}

#[async_trait]
impl CaptionSource for DirectCaptionFetch {
    async fn fetch_captions(&self, url: &str) -> Result<CaptionFetch> {
        let video_id = utils::video_id_from_url(url)
            .ok_or_else(|| anyhow::anyhow!("Could not find a video id in URL: {}", url))?;

        let player = self.get_player_response(&video_id).await?;

        let tracks = player
            .captions
            .as_ref()
            .map(|c| c.player_captions_tracklist_renderer.caption_tracks.as_slice())
            .unwrap_or_default();
        let codes: Vec<String> = tracks.iter().map(TrackInfo::code).collect();

        let Some(track) = CaptionTrack::select(codes.iter().map(String::as_str)) else {
            tracing::info!("No preferred caption track for {} (available: {:?})", video_id, codes);
            return Ok(CaptionFetch::NoCaptions);
        };

        let track_info = tracks
            .iter()
            .find(|t| t.code() == track.code())
            .ok_or_else(|| anyhow::anyhow!("Caption track {} disappeared", track))?;

        let raw_subtitles = self.download_track(track_info).await?;
        let metadata = metadata_from_player(&player, &video_id, url);

        tracing::info!("Captions downloaded for video: {} ({})", metadata.title, track);

        Ok(CaptionFetch::Found {
            raw_subtitles,
            track,
            metadata,
        })
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> DirectCaptionFetch {
        let mut config = Config::default().source;
        config.youtube_base_url = server.uri();
        DirectCaptionFetch::new(&config).unwrap()
    }

    fn player_body(tracks: serde_json::Value) -> serde_json::Value {
        json!({
            "playabilityStatus": { "status": "OK" },
            "videoDetails": {
                "videoId": "dQw4w9WgXcQ",
                "title": "A Video",
                "author": "Someone",
                "channelId": "UCabc",
                "shortDescription": "About things",
                "keywords": ["music", "video"]
            },
            "microformat": {
                "playerMicroformatRenderer": { "publishDate": "2009-10-24T23:57:33-07:00" }
            },
            "captions": {
                "playerCaptionsTracklistRenderer": { "captionTracks": tracks }
            }
        })
    }

    #[test]
    fn test_track_code() {
        let track = |vss: Option<&str>, kind: Option<&str>| TrackInfo {
            base_url: String::new(),
            language_code: "pt".to_string(),
            kind: kind.map(str::to_string),
            vss_id: vss.map(str::to_string),
        };

        assert_eq!(track(Some("a.pt"), Some("asr")).code(), "a.pt");
        assert_eq!(track(Some(".pt"), None).code(), "pt");
        assert_eq!(track(None, Some("asr")).code(), "a.pt");
        assert_eq!(track(None, None).code(), "pt");
    }

    #[test]
    fn test_timed_text_to_cues_skips_empty_events() {
        let timed_text: TimedText = serde_json::from_value(json!({
            "events": [
                { "tStartMs": 0, "dDurationMs": 5000 },
                { "tStartMs": 100, "dDurationMs": 900, "segs": [{ "utf8": "Olá" }, { "utf8": " mundo" }] },
                { "tStartMs": 1000, "dDurationMs": 10, "segs": [{ "utf8": "\n" }] }
            ]
        }))
        .unwrap();

        assert_eq!(
            timed_text_to_cues(timed_text),
            vec![Cue { start_ms: 100, end_ms: 1000, text: "Olá mundo".to_string() }]
        );
    }

    #[test]
    fn test_cue_end_saturates_on_huge_durations() {
        let timed_text: TimedText = serde_json::from_value(json!({
            "events": [
                { "tStartMs": u64::MAX - 1, "dDurationMs": 10, "segs": [{ "utf8": "fim" }] }
            ]
        }))
        .unwrap();

        assert_eq!(timed_text_to_cues(timed_text)[0].end_ms, u64::MAX);
    }

    #[test]
    fn test_metadata_video_id_is_sanitized() {
        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": { "status": "OK" },
            "videoDetails": { "videoId": "../../etc/abc123", "title": "t" }
        }))
        .unwrap();

        let metadata = metadata_from_player(&player, "abc123", "https://youtu.be/abc123");
        assert_eq!(metadata.video_id, "etcabc123");
    }

    #[tokio::test]
    async fn test_fetch_prefers_auto_portuguese() {
        let server = MockServer::start().await;
        let tracks = json!([
            { "baseUrl": format!("{}/api/timedtext?lang=en", server.uri()), "languageCode": "en", "vssId": ".en" },
            { "baseUrl": format!("{}/api/timedtext?lang=pt", server.uri()), "languageCode": "pt", "kind": "asr", "vssId": "a.pt" }
        ]);

        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(player_body(tracks)))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .and(query_param("lang", "pt"))
            .and(query_param("fmt", "json3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [
                    { "tStartMs": 0, "dDurationMs": 1000, "segs": [{ "utf8": "bom dia" }] },
                    { "tStartMs": 1000, "dDurationMs": 1000, "segs": [{ "utf8": "Bom dia" }] }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fetch = source_for(&server)
            .fetch_captions("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap();

        match fetch {
            CaptionFetch::Found { raw_subtitles, track, metadata } => {
                assert_eq!(track, CaptionTrack::AutoPortuguese);
                assert!(raw_subtitles.starts_with("1\n00:00:00,000 --> 00:00:01,000\nbom dia\n"));
                assert_eq!(metadata.title, "A Video");
                assert_eq!(metadata.channel_id, "UCabc");
                assert_eq!(metadata.keywords, vec!["music", "video"]);
                assert_eq!(
                    metadata.publish_date.map(|d| d.to_string()),
                    Some("2009-10-24 23:57:33".to_string())
                );
            }
            CaptionFetch::NoCaptions => panic!("expected captions"),
        }
    }

    #[tokio::test]
    async fn test_fetch_without_preferred_tracks() {
        let server = MockServer::start().await;
        let tracks = json!([
            { "baseUrl": format!("{}/api/timedtext?lang=es", server.uri()), "languageCode": "es", "vssId": ".es" }
        ]);

        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(player_body(tracks)))
            .mount(&server)
            .await;

        let fetch = source_for(&server)
            .fetch_captions("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap();

        assert_eq!(fetch, CaptionFetch::NoCaptions);
    }

    #[tokio::test]
    async fn test_unplayable_video_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "playabilityStatus": { "status": "ERROR", "reason": "Video unavailable" }
            })))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch_captions("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Video unavailable"));
    }

    #[tokio::test]
    async fn test_url_without_video_id() {
        let server = MockServer::start().await;
        let result = source_for(&server).fetch_captions("https://example.com/").await;
        assert!(result.is_err());
    }
}
