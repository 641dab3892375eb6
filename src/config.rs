use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the volunteer ledger
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Database settings
    pub database: DatabaseConfig,
    /// Transaction retry settings
    pub retry: RetryConfig,
    /// Input limits and paging
    pub limits: LimitsConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// How long a statement waits for a row/table lock before failing
    pub busy_timeout_ms: u64,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per transaction, including the first
    pub max_attempts: u32,
    /// Linear backoff base between attempts
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum characters in a void/recalculate/supplement reason
    pub max_reason_chars: usize,
    /// Maximum characters in a caller-supplied idempotency key
    pub max_idempotency_key_chars: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level directive (e.g. "info", "volunteer_ledger=debug")
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://volunteer-ledger.db".to_string(),
            max_connections: 10,
            busy_timeout_ms: 5_000,
            auto_migrate: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 20,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_reason_chars: 500,
            max_idempotency_key_chars: 128,
            default_page_size: 50,
            max_page_size: 100,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file at `path`, when it exists
    /// 3. Environment variables (prefixed with VOLUNTEER_LEDGER_, sections split by "__")
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("VOLUNTEER_LEDGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let ledger_config: LedgerConfig = config.try_deserialize()?;
        Ok(ledger_config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
