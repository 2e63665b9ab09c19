use anyhow::Context;
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::Client as S3Client;
use std::collections::{BTreeMap, HashMap};

use super::{ObjectStore, PutObjectRequest};
use crate::config::S3Config;
use crate::utils::format_file_size;
use crate::Result;

/// Upper bound on the combined size of user metadata keys and values
pub const USER_METADATA_LIMIT: usize = 2048;

/// Metadata field shortened to fit [`USER_METADATA_LIMIT`]
const TRUNCATABLE_FIELD: &str = "description";

/// Percent-encode metadata values so they are valid `x-amz-meta-*` header values,
/// shortening the description when the total would exceed [`USER_METADATA_LIMIT`]
pub fn encode_user_metadata(metadata: BTreeMap<String, String>) -> HashMap<String, String> {
    let mut encoded: HashMap<String, String> = metadata
        .iter()
        .filter(|(key, _)| key.as_str() != TRUNCATABLE_FIELD)
        .map(|(key, value)| (key.clone(), urlencoding::encode(value).into_owned()))
        .collect();

    let Some(description) = metadata.get(TRUNCATABLE_FIELD) else {
        return encoded;
    };

    let used: usize = encoded.iter().map(|(k, v)| k.len() + v.len()).sum();
    let budget = USER_METADATA_LIMIT.saturating_sub(used + TRUNCATABLE_FIELD.len());

    let mut value = String::new();
    let mut buf = [0u8; 4];
    for c in description.chars() {
        let piece = urlencoding::encode(c.encode_utf8(&mut buf));
        if value.len() + piece.len() > budget {
            tracing::debug!("Truncated {} to fit S3 metadata limit", TRUNCATABLE_FIELD);
            break;
        }
        value.push_str(&piece);
    }

    encoded.insert(TRUNCATABLE_FIELD.to_string(), value);
    encoded
}

/// Amazon S3 sink
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            client: S3Client::new(&aws_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, request: PutObjectRequest) -> Result<String> {
        let path = format!("s3://{}/{}", request.bucket, request.key);
        tracing::info!("Uploading {} to {}", format_file_size(request.body.len() as u64), path);

        let metadata = encode_user_metadata(request.metadata);

        self.client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(request.body.into())
            .content_type(&request.content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .context("Failed to upload transcript to S3")?;

        Ok(path)
    }

    fn scheme(&self) -> &'static str {
        "s3"
    }
}
