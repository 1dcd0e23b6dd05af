use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub edge: EdgeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Bind address for the health endpoint.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum jobs pulled per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Queue lease duration in seconds.
    #[serde(default = "default_visibility")]
    pub visibility_timeout_secs: u64,
    /// Sleep between pulls when the queue is empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Sleep after processing a batch, to avoid rapid polling.
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            batch_size: default_batch_size(),
            visibility_timeout_secs: default_visibility(),
            poll_interval_secs: default_poll_interval(),
            idle_backoff_secs: default_idle_backoff(),
            log_level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_visibility() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    5
}
fn default_idle_backoff() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

/// S3-compatible object storage (R2, MinIO, S3).
///
/// Credentials are read from the `AUDITOR_STORAGE_ACCESS_KEY_ID` and
/// `AUDITOR_STORAGE_SECRET_ACCESS_KEY` environment variables, never from
/// the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services. When unset, the
    /// standard `<bucket>.s3.<region>.amazonaws.com` host is used.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "auto".to_string()
}
fn default_storage_timeout() -> u64 {
    60
}

/// LLM gateway used for text extraction, embeddings, and chat.
///
/// The API key is read from the `AUDITOR_GATEWAY_API_KEY` environment
/// variable.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_chat_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-004".to_string()
}
fn default_gateway_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

/// Edge worker API: job queue, vector index proxy, and relational store.
///
/// The auth token is read from the `AUDITOR_EDGE_TOKEN` environment
/// variable.
#[derive(Debug, Deserialize, Clone)]
pub struct EdgeConfig {
    pub base_url: String,
    #[serde(default = "default_edge_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_edge_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1500
}
fn default_overlap_chars() -> usize {
    200
}

/// Parameters for the deterministic audit checks.
#[derive(Debug, Deserialize, Clone)]
pub struct ChecksConfig {
    #[serde(default = "default_round_threshold")]
    pub round_threshold: f64,
    #[serde(default = "default_round_min_amount")]
    pub round_min_amount: f64,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            round_threshold: default_round_threshold(),
            round_min_amount: default_round_min_amount(),
        }
    }
}

fn default_round_threshold() -> f64 {
    100.0
}
fn default_round_min_amount() -> f64 {
    1000.0
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.worker.batch_size == 0 {
        anyhow::bail!("worker.batch_size must be > 0");
    }
    if config.worker.visibility_timeout_secs == 0 {
        anyhow::bail!("worker.visibility_timeout_secs must be > 0");
    }

    if config.storage.bucket.is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }

    if config.gateway.base_url.is_empty() {
        anyhow::bail!("gateway.base_url must not be empty");
    }
    if config.edge.base_url.is_empty() {
        anyhow::bail!("edge.base_url must not be empty");
    }

    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be smaller than chunking.chunk_chars");
    }

    if config.checks.round_threshold <= 0.0 {
        anyhow::bail!("checks.round_threshold must be > 0");
    }
    if config.checks.round_min_amount < 0.0 {
        anyhow::bail!("checks.round_min_amount must be >= 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[storage]
bucket = "uploads"

[gateway]
base_url = "https://gateway.example.com/v1"

[edge]
base_url = "https://edge.example.com"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.worker.batch_size, 10);
        assert_eq!(config.worker.bind, "0.0.0.0:8080");
        assert_eq!(config.storage.region, "auto");
        assert_eq!(config.gateway.chat_model, "gemini-2.0-flash");
        assert_eq!(config.chunking.chunk_chars, 1500);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.checks.round_threshold, 100.0);
        assert_eq!(config.checks.round_min_amount, 1000.0);
    }

    #[test]
    fn test_rejects_overlap_not_below_chunk_size() {
        let file = write_config(&format!(
            "{}\n[chunking]\nchunk_chars = 100\noverlap_chars = 100\n",
            MINIMAL
        ));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_zero_round_threshold() {
        let file = write_config(&format!(
            "{}\n[checks]\nround_threshold = 0.0\n",
            MINIMAL
        ));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_empty_bucket() {
        let file = write_config(
            r#"
[storage]
bucket = ""

[gateway]
base_url = "https://gateway.example.com"

[edge]
base_url = "https://edge.example.com"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_config(Path::new("/nonexistent/auditor.toml")).is_err());
    }
}
