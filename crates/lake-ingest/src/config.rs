//! Ingestion configuration
//!
//! Loaded from an optional TOML file and `LAKE_`-prefixed environment
//! variables, nested with a double underscore:
//!
//! ```text
//! LAKE_WATCH__DIR=/data/incoming
//! LAKE_LAKE__RAW_BUCKET=raw-zone
//! LAKE_DISCOVERY__MAX_WAIT_SECS=600
//! ```
//!
//! Environment variables win over the file. Anything left unset falls back
//! to the defaults below.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stream::MAX_BATCH_RECORDS;
use crate::wait::WaitPolicy;

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default watched directory
pub const DEFAULT_WATCH_DIR: &str = ".";

/// Default seconds between two snapshots of the watched directory
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 100;

/// Default landing bucket
pub const DEFAULT_RAW_BUCKET: &str = "raw-zone";

/// Default schema discovery crawler
pub const DEFAULT_CRAWLER_NAME: &str = "raw-zone-crawler";

/// Default seconds between two crawler status polls
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 5;

/// Default upper bound on waiting for the crawler (15 minutes)
pub const DEFAULT_DISCOVERY_MAX_WAIT_SECS: u64 = 900;

/// Default transform job
pub const DEFAULT_JOB_NAME: &str = "raw-to-trusted";

/// Default record stream
pub const DEFAULT_STREAM_NAME: &str = "lake-ingress";

/// Default seconds between two stream status polls
pub const DEFAULT_STREAM_INTERVAL_SECS: u64 = 5;

/// Default upper bound on waiting for the stream or delivery buffer
pub const DEFAULT_STREAM_MAX_WAIT_SECS: u64 = 300;

/// Default individual resend attempts for a record a batch call rejected
pub const DEFAULT_MAX_RESEND_ATTEMPTS: u32 = 3;

/// Default partition key for produced records
pub const DEFAULT_PARTITION_KEY: &str = "lake-ingest";

/// Prefix of the configuration environment variables
pub const ENV_PREFIX: &str = "LAKE";

/// Main ingestion configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub aws: AwsConfig,
    pub watch: WatchConfig,
    pub lake: LakeConfig,
    pub discovery: DiscoveryConfig,
    pub transform: TransformConfig,
    pub stream: StreamConfig,
}

/// Connection settings shared by every AWS client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    /// Custom endpoint (LocalStack, MinIO); `None` uses the AWS default
    pub endpoint: Option<String>,
    /// Static credentials; when unset the default provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Path-style S3 addressing, needed by most local emulators
    pub path_style: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub dir: PathBuf,
    pub interval_secs: u64,
}

/// Where ingested files land
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LakeConfig {
    pub raw_bucket: String,
    /// Prepended to every uploaded file name, e.g. `incoming/`
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub crawler_name: String,
    pub interval_secs: u64,
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub job_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub stream_name: String,
    /// Delivery buffer draining the stream; skipped when unset
    pub delivery_stream_name: Option<String>,
    pub interval_secs: u64,
    pub max_wait_secs: u64,
    pub max_resend_attempts: u32,
    /// Records per batch call, at most 500
    pub batch_size: usize,
    pub partition_key: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_WATCH_DIR),
            interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
        }
    }
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            raw_bucket: DEFAULT_RAW_BUCKET.to_string(),
            key_prefix: String::new(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            crawler_name: DEFAULT_CRAWLER_NAME.to_string(),
            interval_secs: DEFAULT_DISCOVERY_INTERVAL_SECS,
            max_wait_secs: DEFAULT_DISCOVERY_MAX_WAIT_SECS,
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            delivery_stream_name: None,
            interval_secs: DEFAULT_STREAM_INTERVAL_SECS,
            max_wait_secs: DEFAULT_STREAM_MAX_WAIT_SECS,
            max_resend_attempts: DEFAULT_MAX_RESEND_ATTEMPTS,
            batch_size: MAX_BATCH_RECORDS,
            partition_key: DEFAULT_PARTITION_KEY.to_string(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from `path` (if given) and the environment, then validate it
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: IngestConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.aws.region.trim().is_empty() {
            anyhow::bail!("aws.region must not be empty");
        }
        if self.aws.access_key.is_some() != self.aws.secret_key.is_some() {
            anyhow::bail!("aws.access_key and aws.secret_key must be set together");
        }
        if self.watch.interval_secs == 0 {
            anyhow::bail!("watch.interval_secs must be greater than 0");
        }
        if self.lake.raw_bucket.trim().is_empty() {
            anyhow::bail!("lake.raw_bucket must not be empty");
        }
        if self.discovery.crawler_name.trim().is_empty() {
            anyhow::bail!("discovery.crawler_name must not be empty");
        }
        if self.discovery.interval_secs == 0 {
            anyhow::bail!("discovery.interval_secs must be greater than 0");
        }
        if self.discovery.max_wait_secs < self.discovery.interval_secs {
            anyhow::bail!("discovery.max_wait_secs must be at least discovery.interval_secs");
        }
        if self.transform.job_name.trim().is_empty() {
            anyhow::bail!("transform.job_name must not be empty");
        }
        self.stream.validate()?;
        Ok(())
    }

    /// Wait policy for the schema discovery crawler
    pub fn discovery_wait(&self) -> WaitPolicy {
        WaitPolicy::from_secs(self.discovery.interval_secs, self.discovery.max_wait_secs)
    }

    /// Get the watch interval as Duration
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch.interval_secs)
    }
}

impl StreamConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream_name.trim().is_empty() {
            anyhow::bail!("stream.stream_name must not be empty");
        }
        if matches!(&self.delivery_stream_name, Some(name) if name.trim().is_empty()) {
            anyhow::bail!("stream.delivery_stream_name must not be empty when set");
        }
        if self.interval_secs == 0 {
            anyhow::bail!("stream.interval_secs must be greater than 0");
        }
        if self.max_wait_secs < self.interval_secs {
            anyhow::bail!("stream.max_wait_secs must be at least stream.interval_secs");
        }
        if self.max_resend_attempts == 0 {
            anyhow::bail!("stream.max_resend_attempts must be greater than 0");
        }
        if !(1..=MAX_BATCH_RECORDS).contains(&self.batch_size) {
            anyhow::bail!(
                "stream.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_RECORDS,
                self.batch_size
            );
        }
        if self.partition_key.is_empty() {
            anyhow::bail!("stream.partition_key must not be empty");
        }
        Ok(())
    }

    pub fn wait(&self) -> WaitPolicy {
        WaitPolicy::from_secs(self.interval_secs, self.max_wait_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("LAKE_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.watch.interval_secs, 100);
        assert_eq!(config.stream.batch_size, 500);
        assert_eq!(config.discovery_wait(), WaitPolicy::from_secs(5, 900));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = IngestConfig::default();
        config.watch.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.discovery.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_batch_size_out_of_range() {
        let mut config = IngestConfig::default();
        config.stream.batch_size = 0;
        assert!(config.validate().is_err());

        config.stream.batch_size = 501;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));

        config.stream.batch_size = 1;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_half_static_credentials() {
        let mut config = IngestConfig::default();
        config.aws.access_key = Some("AKIA".to_string());
        assert!(config.validate().is_err());

        config.aws.secret_key = Some("secret".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let mut config = IngestConfig::default();
        config.transform.job_name = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.stream.delivery_stream_name = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[watch]
dir = "/data/incoming"
interval_secs = 30

[lake]
raw_bucket = "raw-lambdaarch"
key_prefix = "incoming/"

[stream]
delivery_stream_name = "lake-delivery"
batch_size = 250
"#
        )
        .unwrap();

        let config = IngestConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.watch.dir, PathBuf::from("/data/incoming"));
        assert_eq!(config.watch.interval_secs, 30);
        assert_eq!(config.lake.raw_bucket, "raw-lambdaarch");
        assert_eq!(config.lake.key_prefix, "incoming/");
        assert_eq!(config.stream.delivery_stream_name.as_deref(), Some("lake-delivery"));
        assert_eq!(config.stream.batch_size, 250);
        // untouched sections keep their defaults
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[discovery]\ncrawler_name = \"from-file\"").unwrap();

        std::env::set_var("LAKE_DISCOVERY__CRAWLER_NAME", "from-env");
        std::env::set_var("LAKE_DISCOVERY__MAX_WAIT_SECS", "60");
        let config = IngestConfig::load(Some(file.path()));
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.discovery.crawler_name, "from-env");
        assert_eq!(config.discovery.max_wait_secs, 60);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_values() {
        clear_env();
        std::env::set_var("LAKE_STREAM__BATCH_SIZE", "1000");
        let result = IngestConfig::load(None);
        clear_env();

        assert!(result.is_err());
    }
}
