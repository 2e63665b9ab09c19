use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod gcs;
pub mod s3;

use crate::config::{StorageBackend, StorageConfig};
use crate::Result;

/// Content type of uploaded transcripts
pub const TRANSCRIPT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// An object to write, with the metadata attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Sink that stores objects in a named bucket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the object and its metadata, returning the fully-qualified path
    async fn put_object(&self, request: PutObjectRequest) -> Result<String>;

    /// URI scheme of the returned paths
    fn scheme(&self) -> &'static str;
}

/// Object key for a video's transcript
pub fn transcript_key(prefix: &str, video_id: &str) -> String {
    format!("{}{}.txt", prefix, video_id)
}

/// Check a bucket name against the GCS naming rules: 3-63 characters of
/// `[a-z0-9._-]`, starting and ending with a letter or digit
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-');
    let alphanumeric = |c: Option<char>| c.map_or(false, |c| c.is_ascii_lowercase() || c.is_ascii_digit());

    if !(3..=63).contains(&name.len()) {
        anyhow::bail!("bucket name must be 3-63 characters long: {:?}", name);
    }
    if !name.chars().all(valid_char) {
        anyhow::bail!("bucket name may only contain a-z, 0-9, '.', '_' and '-': {:?}", name);
    }
    if !alphanumeric(name.chars().next()) || !alphanumeric(name.chars().last()) {
        anyhow::bail!("bucket name must start and end with a letter or digit: {:?}", name);
    }

    Ok(())
}

/// Build the object store selected by configuration
pub async fn build_object_store(config: &StorageConfig) -> Result<Box<dyn ObjectStore>> {
    let store: Box<dyn ObjectStore> = match config.backend {
        StorageBackend::Gcs => Box::new(gcs::GcsStore::new(&config.gcs)?),
        StorageBackend::S3 => Box::new(s3::S3Store::new(&config.s3).await),
    };

    tracing::info!("Using object store: {}://", store.scheme());
    Ok(store)
}
