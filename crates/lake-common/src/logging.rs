//! `tracing` setup shared by every binary
//!
//! Lines go to stdout, to a daily rolling file, or to both, as text or JSON.
//! A base level can be narrowed or widened per module with extra filter
//! directives, and every setting can be overridden with a `LAKE_LOG_*`
//! environment variable.
//!
//! Log with fields, not formatted messages:
//!
//! ```rust,ignore
//! info!(key = %key, bucket = %bucket, "Object uploaded");
//! warn!(error = %err, files = batch.len(), "Dispatch failed");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lake_common::logging::{init_logging, LogConfig};
//! use tracing::Level;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::new("lake-ingest").with_level(Level::DEBUG).merge_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("watcher started");
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Stdout,
    File,
    Both,
}

impl LogTarget {
    fn stdout(self) -> bool {
        self != LogTarget::File
    }

    fn file(self) -> bool {
        self != LogTarget::Stdout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Look `value` up in `choices`, ignoring case
fn choose<T: Copy>(kind: &str, value: &str, choices: &[(&str, T)]) -> Result<T> {
    let wanted = value.trim().to_ascii_lowercase();
    match choices.iter().find(|(name, _)| *name == wanted) {
        Some((_, choice)) => Ok(*choice),
        None => bail!("Unknown log {kind} '{value}'"),
    }
}

impl std::str::FromStr for LogTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        choose(
            "target",
            s,
            &[
                ("stdout", LogTarget::Stdout),
                ("console", LogTarget::Stdout),
                ("file", LogTarget::File),
                ("both", LogTarget::Both),
            ],
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        choose("format", s, &[("text", LogFormat::Text), ("json", LogFormat::Json)])
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub target: LogTarget,
    pub format: LogFormat,
    /// Directory of the rolling files
    pub dir: PathBuf,
    /// Rolling file name prefix: `lake-ingest` gives `lake-ingest.2024-01-18`
    pub file_prefix: String,
    /// Comma-separated directives such as `aws_config=warn,lake_ingest=debug`
    pub directives: Option<String>,
    /// Source file and line on every event
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("lake")
    }
}

impl LogConfig {
    pub fn new(file_prefix: impl Into<String>) -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::Stdout,
            format: LogFormat::Text,
            dir: PathBuf::from("logs"),
            file_prefix: file_prefix.into(),
            directives: None,
            source_location: false,
        }
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    /// Apply whichever of these are set:
    ///
    /// | variable | values |
    /// |---|---|
    /// | `LAKE_LOG_LEVEL` | trace, debug, info, warn, error |
    /// | `LAKE_LOG_TARGET` | stdout, file, both |
    /// | `LAKE_LOG_FORMAT` | text, json |
    /// | `LAKE_LOG_DIR` | directory |
    /// | `LAKE_LOG_FILE_PREFIX` | file name prefix |
    /// | `LAKE_LOG_FILTER` | extra directives, appended |
    /// | `LAKE_LOG_SOURCE_LOCATION` | true, false |
    pub fn merge_env(mut self) -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(level) = var("LAKE_LOG_LEVEL") {
            self.level = level
                .trim()
                .parse()
                .with_context(|| format!("Unknown log level '{level}'"))?;
        }
        if let Some(target) = var("LAKE_LOG_TARGET") {
            self.target = target.parse()?;
        }
        if let Some(format) = var("LAKE_LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = var("LAKE_LOG_DIR") {
            self.dir = dir.into();
        }
        if let Some(prefix) = var("LAKE_LOG_FILE_PREFIX") {
            self.file_prefix = prefix;
        }
        if let Some(extra) = var("LAKE_LOG_FILTER") {
            self.directives = Some(match self.directives.take() {
                Some(base) => format!("{base},{extra}"),
                None => extra,
            });
        }
        if let Some(flag) = var("LAKE_LOG_SOURCE_LOCATION") {
            self.source_location = flag.trim().eq_ignore_ascii_case("true") || flag.trim() == "1";
        }

        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy();

        for directive in self
            .directives
            .iter()
            .flat_map(|d| d.split(','))
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            let parsed = directive
                .parse()
                .with_context(|| format!("Invalid log filter directive '{directive}'"))?;
            filter = filter.add_directive(parsed);
        }

        Ok(filter)
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_span_events(FmtSpan::CLOSE);

        match self.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// Call once at startup. With file output the returned guard flushes the
/// background writer when dropped, so hold it until the process exits.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.target.stdout() {
        layers.push(config.layer(std::io::stdout, true));
    }

    if config.target.file() {
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("Failed to create log directory {}", config.dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(config.layer(writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter()?)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}
