use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use streamprint::printer::StreamPrinterConfig;
use streamprint::sink::OutputFormat;
use streamprint::storage::MemoryStorageConfig;
use streamprint::stream::QueueStream;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub printer: PrinterConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_reads_per_transaction: Option<usize>,
    pub max_transaction_age_ms: Option<u64>,
}

impl StorageConfig {
    pub fn to_memory_config(&self) -> MemoryStorageConfig {
        MemoryStorageConfig {
            max_reads_per_transaction: self.max_reads_per_transaction,
            max_transaction_age: self.max_transaction_age_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub queue: String,
    pub interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            queue: "input".to_string(),
            interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub commit_retry_delay_ms: u64,
}

impl PrinterConfig {
    pub fn to_printer_config(&self) -> StreamPrinterConfig {
        StreamPrinterConfig {
            commit_retry_delay: Duration::from_millis(self.commit_retry_delay_ms),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Skipping config {}: {:#}", candidate.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Discovered config files in priority order:
    /// `~/.config/<project>/<project>.yml`, then `./<project>.yml`.
    fn candidates() -> Vec<PathBuf> {
        let project_name = env!("CARGO_PKG_NAME");
        let file_name = format!("{}.yml", project_name);

        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(project_name).join(&file_name));
        }
        paths.push(PathBuf::from(file_name));
        paths
    }

    /// Check values that parse but cannot produce a working run.
    pub fn validate(&self) -> Result<()> {
        if self.feed.queue.trim().is_empty() {
            eyre::bail!("feed.queue must not be empty");
        }
        self.storage
            .to_memory_config()
            .validate(QueueStream::READS_PER_PULL)
            .context("Invalid storage section")?;
        Ok(())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!(
            "Loaded config from: {} (format: {}, queue: {})",
            path.as_ref().display(),
            config.output.format,
            config.feed.queue
        );
        Ok(config)
    }
}
