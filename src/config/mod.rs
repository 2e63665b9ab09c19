use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::captions::CaptionSourceKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Caption retrieval settings
    pub source: SourceConfig,

    /// Object storage settings
    pub storage: StorageConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Retrieval mechanism
    pub kind: CaptionSourceKind,

    /// yt-dlp executable, used by the subtitle tool source
    pub yt_dlp_path: String,

    /// Player API client identity
    pub client_name: String,
    pub client_version: String,

    /// Base URL of the YouTube web endpoints
    pub youtube_base_url: String,

    /// Timeout for each HTTP request in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which object store receives the transcripts
    pub backend: StorageBackend,

    /// Prefix prepended to every object key
    pub key_prefix: String,

    pub gcs: GcsConfig,

    pub s3: S3Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    /// JSON API base URL
    pub api_base: String,

    /// Static OAuth access token; falls back to `GCS_ACCESS_TOKEN` and then the metadata server
    pub access_token: Option<String>,

    /// Metadata server token endpoint
    pub metadata_token_url: String,

    /// Project billed for requests, sent as `x-goog-user-project`
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for spooled transcripts and subtitle tool output
    pub temp_dir: Option<PathBuf>,

    /// `text` or `json` log lines
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            source: SourceConfig {
                kind: CaptionSourceKind::Direct,
                yt_dlp_path: "yt-dlp".to_string(),
                client_name: "ANDROID".to_string(),
                client_version: "19.09.37".to_string(),
                youtube_base_url: "https://www.youtube.com".to_string(),
                request_timeout_secs: 30,
            },
            storage: StorageConfig {
                backend: StorageBackend::Gcs,
                key_prefix: "youtube-captions/".to_string(),
                gcs: GcsConfig {
                    api_base: "https://storage.googleapis.com".to_string(),
                    access_token: None,
                    metadata_token_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
                    project: None,
                },
                s3: S3Config {
                    region: "us-east-1".to_string(),
                },
            },
            app: AppConfig {
                temp_dir: None,
                log_format: "text".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Load and validate a specific configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("caption-uploader").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.key_prefix.starts_with('/') {
            anyhow::bail!("Storage key prefix must not start with '/'");
        }

        if self.storage.backend == StorageBackend::S3 && self.storage.s3.region.is_empty() {
            anyhow::bail!("S3 region must be configured");
        }

        if self.source.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than zero");
        }

        if !matches!(self.app.log_format.as_str(), "text" | "json") {
            anyhow::bail!("Log format must be 'text' or 'json', got '{}'", self.app.log_format);
        }

        Ok(())
    }

    /// Directory for temporary files
    pub fn temp_dir(&self) -> PathBuf {
        self.app.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Listen Address: {}:{}", self.server.host, self.server.port);
        println!("  Caption Source: {}", self.source.kind);
        println!("  Player Client: {} {}", self.source.client_name, self.source.client_version);
        println!("  Storage Backend: {:?}", self.storage.backend);
        println!("  Key Prefix: {}", self.storage.key_prefix);
        if self.storage.backend == StorageBackend::S3 {
            println!("  S3 Region: {}", self.storage.s3.region);
        }
        if let Some(project) = &self.storage.gcs.project {
            println!("  GCS Project: {}", project);
        }
        println!("  Temp Directory: {}", self.temp_dir().display());
        if let Ok(path) = Self::config_path() {
            println!("  Config File: {}", path.display());
        }
    }
}
