use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ObjectStore, PutObjectRequest};
use crate::config::GcsConfig;
use crate::utils::format_file_size;
use crate::Result;

/// Environment variable consulted when no token is configured
pub const ACCESS_TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Google Cloud Storage sink using the JSON API
pub struct GcsStore {
    client: Client,
    api_base: String,
    access_token: Option<String>,
    metadata_token_url: String,
    project: Option<String>,
}

/// Header naming the project billed for a request
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

impl GcsStore {
    pub fn new(config: &GcsConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            metadata_token_url: config.metadata_token_url.clone(),
            project: config.project.clone(),
        })
    }

    async fn access_token(&self) -> Result<String> {
        self.token_from(std::env::var(ACCESS_TOKEN_ENV).ok()).await
    }

    /// Configured token, then the environment, then the instance metadata server
    async fn token_from(&self, env_token: Option<String>) -> Result<String> {
        if let Some(token) = self.access_token.clone().or(env_token) {
            return Ok(token);
        }

        tracing::debug!("Requesting access token from metadata server");

        let response = self
            .client
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("No GCS credentials configured and the metadata server is unreachable")?;

        if !response.status().is_success() {
            anyhow::bail!("Metadata server refused token request: HTTP {}", response.status());
        }

        let token: MetadataToken = response
            .json()
            .await
            .context("Failed to parse metadata server token")?;

        Ok(token.access_token)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        let builder = builder.bearer_auth(token);
        match &self.project {
            Some(project) => builder.header(USER_PROJECT_HEADER, project),
            None => builder,
        }
    }

    async fn upload_media(&self, token: &str, request: &PutObjectRequest) -> Result<()> {
        let builder = self.client.post(format!(
            "{}/upload/storage/v1/b/{}/o",
            self.api_base,
            urlencoding::encode(&request.bucket)
        ));

        let response = self
            .authorized(builder, token)
            .query(&[("uploadType", "media"), ("name", request.key.as_str())])
            .header(reqwest::header::CONTENT_TYPE, &request.content_type)
            .body(request.body.clone())
            .send()
            .await
            .context("Upload request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upload failed: HTTP {}: {}", status, body.trim());
        }

        Ok(())
    }

    async fn patch_metadata(&self, token: &str, request: &PutObjectRequest) -> Result<()> {
        let builder = self.client.patch(format!(
            "{}/storage/v1/b/{}/o/{}",
            self.api_base,
            urlencoding::encode(&request.bucket),
            urlencoding::encode(&request.key)
        ));

        let response = self
            .authorized(builder, token)
            .json(&json!({ "metadata": request.metadata }))
            .send()
            .await
            .context("Metadata update request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Metadata update failed: HTTP {}: {}", status, body.trim());
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put_object(&self, request: PutObjectRequest) -> Result<String> {
        let path = format!("gs://{}/{}", request.bucket, request.key);
        tracing::info!("Uploading {} to {}", format_file_size(request.body.len() as u64), path);

        let token = self.access_token().await?;
        self.upload_media(&token, &request).await?;
        self.patch_metadata(&token, &request).await?;

        Ok(path)
    }

    fn scheme(&self) -> &'static str {
        "gs"
    }
}
