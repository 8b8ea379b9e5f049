//! Unified Application Configuration
//!
//! Centralized configuration for the whole server. Loaded from a YAML file
//! (`LABELPRESS_CONFIG_PATH`), inline YAML (`LABELPRESS_CONFIG_YAML`), or
//! individual environment variables, in that order of preference.
//! Configuration failures are the only fatal startup errors.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read configuration file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse configuration YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Unified application configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub queue: QueueSettings,
    pub printers: PrinterSettings,
    pub renderer: RendererSettings,
    pub spooler: SpoolerSettings,
    pub http: HttpSettings,
}

impl AppConfig {
    /// Load configuration from environment or file
    pub fn load() -> Result<Self> {
        let config = match (
            std::env::var("LABELPRESS_CONFIG_PATH").ok(),
            std::env::var("LABELPRESS_CONFIG_YAML").ok(),
        ) {
            (Some(path), _) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path));
                }
                let content = std::fs::read_to_string(&path)?;
                serde_yaml::from_str(&content)?
            }
            (None, Some(yaml)) => serde_yaml::from_str(&yaml)?,
            _ => Self::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            queue: QueueSettings::from_env()?,
            printers: PrinterSettings::from_env()?,
            renderer: RendererSettings::from_env()?,
            spooler: SpoolerSettings::from_env()?,
            http: HttpSettings::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        self.printers.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(default),
    }
}

/// HTTP bind and runtime sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Tokio worker threads; 0 leaves the runtime default
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: 0,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("PORT", 8080)?,
            workers: env_parse("WORKERS", 0)?,
        })
    }
}

/// Queue, retry and dispatcher sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_queue_size: usize,
    pub max_concurrent_jobs: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub processing_timeout_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_concurrent_jobs: 5,
            batch_size: 5,
            max_retries: 3,
            retry_delay_ms: 2000,
            processing_timeout_ms: 30_000,
        }
    }
}

impl QueueSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_queue_size: env_parse("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?,
            batch_size: env_parse("BATCH_SIZE", defaults.batch_size)?,
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries)?,
            retry_delay_ms: env_parse("RETRY_DELAY", defaults.retry_delay_ms)?,
            processing_timeout_ms: env_parse(
                "PROCESSING_TIMEOUT",
                defaults.processing_timeout_ms,
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_QUEUE_SIZE must be > 0".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_JOBS must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "BATCH_SIZE must be > 0".to_string(),
            ));
        }
        if self.processing_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "PROCESSING_TIMEOUT must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }
}

/// Printer discovery and health loop
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Health ticker period in seconds; floored at 60 to avoid OS saturation
    pub health_check_interval_secs: u64,
    pub discovery_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 60,
            discovery_timeout_secs: 5,
            probe_timeout_secs: 2,
        }
    }
}

impl PrinterSettings {
    pub const MIN_HEALTH_INTERVAL_SECS: u64 = 60;

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            health_check_interval_secs: env_parse(
                "PRINTER_HEALTH_CHECK_INTERVAL",
                defaults.health_check_interval_secs,
            )?,
            discovery_timeout_secs: defaults.discovery_timeout_secs,
            probe_timeout_secs: defaults.probe_timeout_secs,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "printer probe timeouts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective health period, never below the floor.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(
            self.health_check_interval_secs
                .max(Self::MIN_HEALTH_INTERVAL_SECS),
        )
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Headless-browser renderer
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub chrome_path: Option<String>,
}

impl RendererSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            chrome_path: std::env::var("CHROME_PATH").ok(),
        })
    }
}

/// External PDF-to-printer binary
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpoolerSettings {
    pub path: String,
    pub work_dir: String,
}

impl Default for SpoolerSettings {
    fn default() -> Self {
        Self {
            path: "PDFtoPrinter.exe".to_string(),
            work_dir: "spool".to_string(),
        }
    }
}

impl SpoolerSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            path: std::env::var("SPOOLER_PATH").unwrap_or(defaults.path),
            work_dir: std::env::var("SPOOL_WORK_DIR").unwrap_or(defaults.work_dir),
        })
    }
}

/// HTTP middleware: throttling, CORS, route deadlines
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
    /// CORS allow-list; empty means any origin
    pub allowed_origins: Vec<String>,
    pub route_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            rate_limit_window_ms: 900_000,
            rate_limit_max: 1000,
            allowed_origins: Vec::new(),
            route_timeout_secs: 15,
        }
    }
}

impl HttpSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let allowed_origins = match std::env::var("ALLOWED_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.allowed_origins,
        };
        Ok(Self {
            rate_limit_window_ms: env_parse("RATE_LIMIT_WINDOW_MS", defaults.rate_limit_window_ms)?,
            rate_limit_max: env_parse("RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            allowed_origins,
            route_timeout_secs: defaults.route_timeout_secs,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_window_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_WINDOW_MS must be > 0".to_string(),
            ));
        }
        if self.route_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "route timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_secs(self.route_timeout_secs)
    }
}
