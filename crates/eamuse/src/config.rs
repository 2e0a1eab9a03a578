//! Configuration management for the e-Amuse server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use anyhow::Context;
use eamuse_data::DatabaseConfig;
use eamuse_protocol::crypto::DEFAULT_SECRET;
use eamuse_server::{PaseliSettings, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Default scheduler interval for serde deserialization
fn default_interval_secs() -> u64 {
    3_600
}

fn default_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
///
/// Every section but `[server]` may be left out and takes its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network settings
    pub server: ServerSettings,
    /// Storage settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Default PASELI switches; arcades may override them
    #[serde(default)]
    pub paseli: PaseliSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Background maintenance
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Payload encryption
    #[serde(default)]
    pub crypto: CryptoSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host name or address cabinets are told to use
    pub host: String,
    /// Port cabinets are told to use
    pub port: u16,
    /// Listen address, when it differs from `host:port` (e.g. behind NAT)
    #[serde(default)]
    pub bind_address: Option<String>,
    /// Where browsers hitting this server get redirected
    #[serde(default)]
    pub frontend_port: Option<u16>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between scheduled-work sweeps (0 to disable)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoSettings {
    /// Secret the payload cipher derives packet keys from
    pub secret: String,
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            secret: String::from_utf8_lossy(DEFAULT_SECRET).into_owned(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                bind_address: None,
                frontend_port: None,
            },
            database: DatabaseConfig {
                path: Some("eamuse.db".into()),
                ..DatabaseConfig::default()
            },
            paseli: PaseliSettings::default(),
            logging: LoggingSettings::default(),
            scheduler: SchedulerSettings::default(),
            crypto: CryptoSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// The address to listen on.
    pub fn bind_address(&self) -> String {
        self.server
            .bind_address
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.server.host, self.server.port))
    }

    /// The base per-request configuration handed to the pipeline.
    pub fn to_server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(self.server.host.clone(), self.server.port);
        config.paseli = self.paseli;
        config
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.host.trim().is_empty() {
            return Err("Server host cannot be empty".to_string());
        }
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        let bind = self.bind_address();
        if bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {bind}"));
        }

        if self.database.path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err("Database path cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.crypto.secret.is_empty() {
            return Err("Crypto secret cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.database.path, Some(PathBuf::from("eamuse.db")));
        assert!(!config.paseli.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scheduler.interval_secs, 3_600);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(path.exists());

        // The written file loads back to the same settings.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.bind_address(), config.bind_address());
        assert_eq!(reloaded.crypto.secret, config.crypto.secret);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
host = "eamuse.example.net"
port = 80
bind_address = "0.0.0.0:8000"
frontend_port = 3000

[database]
path = "/var/lib/eamuse/eamuse.db"
busy_timeout_ms = 250

[paseli]
enabled = true
infinite = true

[logging]
level = "debug"
json_format = true

[scheduler]
interval_secs = 0

[crypto]
secret = "not-the-default"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.server.host, "eamuse.example.net");
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.server.frontend_port, Some(3000));
        assert_eq!(config.database.path, Some(PathBuf::from("/var/lib/eamuse/eamuse.db")));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert!(config.paseli.enabled && config.paseli.infinite);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.scheduler.interval_secs, 0);
        assert_eq!(config.crypto.secret, "not-the-default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_deserialization_with_defaults() {
        let config: AppConfig = toml::from_str("[server]\nhost = \"10.0.0.1\"\nport = 8088\n").unwrap();

        assert_eq!(config.database.path, None);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert!(!config.paseli.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scheduler.interval_secs, 3_600);
        assert!(!config.crypto.secret.is_empty());
    }

    #[test]
    fn test_to_server_config_conversion() {
        let mut config = AppConfig::default();
        config.server.host = "192.168.1.100".to_string();
        config.server.port = 9090;
        config.paseli.enabled = true;

        let server_config = config.to_server_config();
        assert_eq!(server_config.url(), "http://192.168.1.100:9090/");
        assert!(server_config.paseli.enabled);
        assert!(server_config.machine.is_none());
        assert!(server_config.client.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.server.host = "eamuse.example.net".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid bind address"));

        config.server.bind_address = Some("0.0.0.0:80".to_string());
        assert!(config.validate().is_ok());

        config.server.port = 0;
        assert!(config.validate().unwrap_err().contains("port"));
        config.server.port = 80;

        config.logging.level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
        config.logging.level = "warn".to_string();

        config.crypto.secret.clear();
        assert!(config.validate().unwrap_err().contains("secret"));
    }
}
