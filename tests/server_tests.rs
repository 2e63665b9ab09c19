use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use caption_uploader::captions::{CaptionFetch, CaptionSource, CaptionTrack, VideoMetadata};
use caption_uploader::pipeline::CaptionPipeline;
use caption_uploader::server::{router, AppState, ConvertResponse, ErrorResponse, HealthResponse};
use caption_uploader::storage::{ObjectStore, PutObjectRequest};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct FakeSource {
    fetch: Option<CaptionFetch>,
}

#[async_trait]
impl CaptionSource for FakeSource {
    async fn fetch_captions(&self, _url: &str) -> anyhow::Result<CaptionFetch> {
        self.fetch
            .clone()
            .ok_or_else(|| anyhow::anyhow!("video unavailable"))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Clone, Default)]
struct RecordingStore {
    uploads: Arc<Mutex<Vec<PutObjectRequest>>>,
    fail: bool,
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(&self, request: PutObjectRequest) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("permission denied");
        }
        let path = format!("gs://{}/{}", request.bucket, request.key);
        self.uploads.lock().unwrap().push(request);
        Ok(path)
    }

    fn scheme(&self) -> &'static str {
        "gs"
    }
}

fn captions() -> CaptionFetch {
    CaptionFetch::Found {
        raw_subtitles: "1\n00:00:01,000 --> 00:00:02,000\nOi pessoal\n\n2\n00:00:02,000 --> 00:00:03,000\noi pessoal\ntchau\n"
            .to_string(),
        track: CaptionTrack::AutoPortuguese,
        metadata: VideoMetadata {
            video_id: "vid42".to_string(),
            title: "Um vídeo".to_string(),
            ..Default::default()
        },
    }
}

fn app(fetch: Option<CaptionFetch>, store: RecordingStore, temp_dir: &std::path::Path) -> axum::Router {
    let pipeline = CaptionPipeline::new(
        Box::new(FakeSource { fetch }),
        Box::new(store),
        "youtube-captions/",
        temp_dir,
    );
    router(Arc::new(AppState { pipeline }))
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

const QUERY: &str = "url=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3Dvid42&gs_bucket_name=captions";

#[tokio::test]
async fn post_uploads_cleaned_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordingStore::default();
    let app = app(Some(captions()), store.clone(), dir.path());

    let response = app
        .oneshot(
            Request::post(format!("/convert_and_upload/?{}", QUERY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ConvertResponse = read_json(response).await;
    assert_eq!(body.message, "File uploaded successfully");
    assert_eq!(body.gcs_url.as_deref(), Some("gs://captions/youtube-captions/vid42.txt"));

    let uploads = store.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].body, b"Oi pessoal\ntchau");
    assert_eq!(uploads[0].metadata["title"], "Um vídeo");
}

#[tokio::test]
async fn get_without_trailing_slash_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(Some(captions()), RecordingStore::default(), dir.path());

    let response = app
        .oneshot(
            Request::get(format!("/convert_and_upload?{}", QUERY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn post_accepts_json_body() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordingStore::default();
    let app = app(Some(captions()), store.clone(), dir.path());

    let response = app
        .oneshot(
            Request::post("/convert_and_upload")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"url": "https://youtu.be/vid42", "bucket": "from-body"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.uploads.lock().unwrap()[0].bucket, "from-body");
}

#[tokio::test]
async fn no_captions_is_not_an_error_and_skips_upload() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordingStore::default();
    let app = app(Some(CaptionFetch::NoCaptions), store.clone(), dir.path());

    let response = app
        .oneshot(
            Request::post(format!("/convert_and_upload/?{}", QUERY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ConvertResponse = read_json(response).await;
    assert_eq!(
        body,
        ConvertResponse {
            message: "No captions found".to_string(),
            gcs_url: None,
        }
    );
    assert!(store.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn source_failure_returns_error_detail() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(None, RecordingStore::default(), dir.path());

    let response = app
        .oneshot(
            Request::post(format!("/convert_and_upload/?{}", QUERY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.detail, "Error downloading video: video unavailable");
}

#[tokio::test]
async fn upload_failure_returns_error_detail() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordingStore {
        fail: true,
        ..Default::default()
    };
    let app = app(Some(captions()), store, dir.path());

    let response = app
        .oneshot(
            Request::post(format!("/convert_and_upload/?{}", QUERY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.detail, "Error uploading captions: permission denied");
}

#[tokio::test]
async fn missing_bucket_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(Some(captions()), RecordingStore::default(), dir.path());

    let response = app
        .oneshot(
            Request::get("/convert_and_upload/?url=https%3A%2F%2Fyoutu.be%2Fvid42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert!(body.detail.contains("gs_bucket_name"));
}

#[tokio::test]
async fn bucket_with_path_characters_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordingStore::default();
    let app = app(Some(captions()), store.clone(), dir.path());

    let response = app
        .oneshot(
            Request::get(
                "/convert_and_upload?url=https%3A%2F%2Fyoutu.be%2Fvid42&gs_bucket_name=victim%2Fo%3Fname%3Downed.txt%23",
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert!(body.detail.starts_with("Invalid request: bucket name"));
    assert!(store.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_query_returns_json_detail() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordingStore::default();
    let app = app(Some(captions()), store.clone(), dir.path());

    let response = app
        .oneshot(
            Request::get("/convert_and_upload?url=https%3A%2F%2Fyoutu.be%2Fa&url=https%3A%2F%2Fyoutu.be%2Fb&gs_bucket_name=captions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()["content-type"],
        "application/json"
    );
    let body: ErrorResponse = read_json(response).await;
    assert!(body.detail.starts_with("Invalid request: "));
    assert!(store.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_source() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(None, RecordingStore::default(), dir.path());

    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: HealthResponse = read_json(response).await;
    assert_eq!(body.status, "ok");
    assert_eq!(body.source, "fake");
}
