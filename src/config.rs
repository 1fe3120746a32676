use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on pipeline runs executing at the same time.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Header carrying the authenticated caller's user id.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_concurrent_runs: default_max_concurrent_runs(),
            identity_header: default_identity_header(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7440".to_string()
}
fn default_max_concurrent_runs() -> usize {
    2
}
fn default_identity_header() -> String {
    "x-user-id".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Root directory for the filesystem backend. Objects live at
    /// `<root>/<bucket>/<path>`.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint (MinIO, GCS interoperability, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_storage_backend() -> String {
    "filesystem".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_num_results")]
    pub max_num_results: u32,
    #[serde(default = "default_vision_max_tokens")]
    pub vision_max_tokens: u32,
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of prior transcript items sent with each chat turn.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            vision_model: default_vision_model(),
            temperature: default_temperature(),
            max_num_results: default_max_num_results(),
            vision_max_tokens: default_vision_max_tokens(),
            timeout_secs: default_openai_timeout_secs(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4.1".to_string()
}
fn default_vision_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_num_results() -> u32 {
    3
}
fn default_vision_max_tokens() -> u32 {
    1000
}
fn default_openai_timeout_secs() -> u64 {
    60
}
fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_pdf_backend")]
    pub pdf_backend: String,
    /// Document AI processor resource name:
    /// `projects/<project>/locations/<location>/processors/<id>`.
    #[serde(default)]
    pub processor: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    /// Blocks above this confidence are rendered as sub-headings.
    #[serde(default = "default_heading_confidence")]
    pub heading_confidence: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdf_backend: default_pdf_backend(),
            processor: None,
            location: default_location(),
            heading_confidence: default_heading_confidence(),
        }
    }
}

fn default_pdf_backend() -> String {
    "document_ai".to_string()
}
fn default_location() -> String {
    "us".to_string()
}
fn default_heading_confidence() -> f32 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_upload_mode")]
    pub upload_mode: String,
    #[serde(default)]
    pub accept_images: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_await_max_secs")]
    pub await_max_secs: u64,
    #[serde(default = "default_expires_after_days")]
    pub expires_after_days: u32,
    #[serde(default = "default_release_max_attempts")]
    pub release_max_attempts: u32,
    #[serde(default = "default_release_backoff_secs")]
    pub release_backoff_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_mode: default_upload_mode(),
            accept_images: false,
            poll_interval_secs: default_poll_interval_secs(),
            await_max_secs: default_await_max_secs(),
            expires_after_days: default_expires_after_days(),
            release_max_attempts: default_release_max_attempts(),
            release_backoff_secs: default_release_backoff_secs(),
        }
    }
}

fn default_upload_mode() -> String {
    "extracted".to_string()
}
fn default_poll_interval_secs() -> u64 {
    1
}
fn default_await_max_secs() -> u64 {
    30
}
fn default_expires_after_days() -> u32 {
    30
}
fn default_release_max_attempts() -> u32 {
    5
}
fn default_release_backoff_secs() -> u64 {
    1
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn await_max(&self) -> Duration {
        Duration::from_secs(self.await_max_secs)
    }

    pub fn release_backoff(&self) -> Duration {
        Duration::from_secs(self.release_backoff_secs)
    }
}

impl Config {
    /// Configuration with every optional section at its default. Used by
    /// tests and by commands that only need a database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            openai: OpenAIConfig::default(),
            extraction: ExtractionConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.max_concurrent_runs == 0 {
        anyhow::bail!("server.max_concurrent_runs must be >= 1");
    }

    match config.storage.backend.as_str() {
        "filesystem" | "s3" => {}
        other => anyhow::bail!(
            "Unknown storage backend: '{}'. Must be filesystem or s3.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.openai.temperature) {
        anyhow::bail!("openai.temperature must be in [0.0, 2.0]");
    }
    if config.openai.max_num_results == 0 {
        anyhow::bail!("openai.max_num_results must be >= 1");
    }

    match config.extraction.pdf_backend.as_str() {
        "local" => {}
        "document_ai" => {
            if config.extraction.processor.is_none() {
                anyhow::bail!(
                    "extraction.processor must be specified when pdf_backend is 'document_ai'"
                );
            }
        }
        other => anyhow::bail!(
            "Unknown PDF backend: '{}'. Must be document_ai or local.",
            other
        ),
    }
    if !(0.0..=1.0).contains(&config.extraction.heading_confidence) {
        anyhow::bail!("extraction.heading_confidence must be in [0.0, 1.0]");
    }

    match config.pipeline.upload_mode.as_str() {
        "extracted" | "raw" => {}
        other => anyhow::bail!(
            "Unknown upload mode: '{}'. Must be extracted or raw.",
            other
        ),
    }
    if config.pipeline.poll_interval_secs == 0 {
        anyhow::bail!("pipeline.poll_interval_secs must be > 0");
    }
    if config.pipeline.poll_interval_secs > config.pipeline.await_max_secs {
        anyhow::bail!("pipeline.poll_interval_secs must not exceed pipeline.await_max_secs");
    }
    if config.pipeline.release_max_attempts == 0 {
        anyhow::bail!("pipeline.release_max_attempts must be >= 1");
    }

    Ok(())
}
