//! Configuration management for the lending desk

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind host; `*` means every interface
    pub host: String,
    pub port: u16,
    /// Largest accepted request frame, in bytes
    pub max_request_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Bound applied to connect, send and receive
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub path: String,
}

/// Loan periods by initiating lookup.
///
/// Loans made by ISBN and by title historically use different periods. Both
/// are kept explicit here instead of being folded into one value.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoansConfig {
    pub isbn_loan_days: u32,
    pub title_loan_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub loans: LoansConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    /// Load configuration using `base` as the default file (extension optional)
    pub fn load_from(base: &str) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let defaults = AppConfig::default();

        let config = Config::builder()
            // Built-in defaults, so every file is optional
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port)?
            .set_default("server.max_request_bytes", defaults.server.max_request_bytes as u64)?
            .set_default("client.server_host", defaults.client.server_host)?
            .set_default("client.server_port", defaults.client.server_port)?
            .set_default("client.timeout_ms", defaults.client.timeout_ms)?
            .set_default("catalog.path", defaults.catalog.path)?
            .set_default("loans.isbn_loan_days", defaults.loans.isbn_loan_days)?
            .set_default("loans.title_loan_days", defaults.loans.title_loan_days)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .add_source(File::with_name(base).required(false))
            // Layer on the environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add environment variables (e.g. LENDING__SERVER__PORT=6000)
            .add_source(
                Environment::with_prefix("LENDING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loans.isbn_loan_days == 0 || self.loans.title_loan_days == 0 {
            return Err(ConfigError::Message(
                "loan periods must be at least one day".to_string(),
            ));
        }
        if self.server.max_request_bytes == 0 {
            return Err(ConfigError::Message(
                "server.max_request_bytes must be positive".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Message(format!(
                "unknown logging format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Address to bind, with `*` mapped to all interfaces
    pub fn bind_address(&self) -> String {
        let host = match self.host.as_str() {
            "*" => "0.0.0.0",
            host => host,
        };
        format!("{}:{}", host, self.port)
    }
}

impl ClientConfig {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost".to_string(),
            server_port: 5555,
            timeout_ms: 10_000,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "DB.json".to_string(),
        }
    }
}

impl Default for LoansConfig {
    fn default() -> Self {
        Self {
            isbn_loan_days: 7,
            title_loan_days: 14,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
