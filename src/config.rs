use crate::errors::GcError;
use crate::infrastructure::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const CONFIG_FILE: &str = ".cascade-gc.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_workers")]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// First retry delay; doubles on every consecutive failure
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound for a single store call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_workers(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            filter: None,
        }
    }
}

fn default_workers() -> usize { 4 }
fn default_base_delay_ms() -> u64 { 5 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_level() -> String { "info".to_string() }

impl GcConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, GcError> {
        let content = fs::read_to_string(path)
            .map_err(|e| GcError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, GcError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GcError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Find and load `.cascade-gc.toml` from the current directory or its parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(path = %config_path.display(), error = %e, "ignoring invalid config"),
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# failed to generate config"))
    }

    pub fn save(&self, path: &Path) -> Result<(), GcError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GcError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| GcError::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), GcError> {
        if self.workers.count == 0 {
            return Err(GcError::Config("workers.count must be at least 1".into()));
        }
        if self.queue.base_delay_ms > self.queue.max_delay_ms {
            return Err(GcError::Config(format!(
                "queue.base_delay_ms ({}) exceeds queue.max_delay_ms ({})",
                self.queue.base_delay_ms, self.queue.max_delay_ms
            )));
        }
        if self.store.timeout_ms == 0 {
            return Err(GcError::Config("store.timeout_ms must be positive".into()));
        }
        Level::from_str(&self.logging.level)
            .map_err(|_| GcError::Config(format!("unknown log level '{}'", self.logging.level)))?;
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.queue.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.queue.max_delay_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    /// Logging set-up for `init_logging`
    pub fn log_config(&self) -> LogConfig {
        let level = Level::from_str(&self.logging.level).unwrap_or(Level::INFO);
        let config = LogConfig::new().with_level(level).with_format(self.logging.format);
        match &self.logging.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }
}
