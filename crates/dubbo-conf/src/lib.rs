//! Layered configuration loading for the dubbo exchange core.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by every crate in the workspace without
//! causing circular dependency issues.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): things that physically cannot
//!   change at runtime - the bind address, shutdown timing, telemetry.
//!
//! - **Exchange defaults** (`ExchangeDefaults`): process-wide fallback
//!   values for parameters an `EndpointUrl` may omit. A caller's own URL
//!   always wins; this just fills gaps.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dubbo_conf::DubboConfig;
//!
//! let config = DubboConfig::load().expect("failed to load config");
//!
//! println!("bind: {}:{}", config.infra.bind.host, config.infra.bind.port);
//! println!("default timeout: {}ms", config.exchange.timeout_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/dubbo-exchange/config.toml` (system)
//! 2. `~/.config/dubbo-exchange/config.toml` (user)
//! 3. `./dubbo-exchange.toml` (local override)
//! 4. Environment variables (`DUBBO_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bind]
//! host = "0.0.0.0"
//! port = 20880
//!
//! [telemetry]
//! log_level = "info"
//!
//! [shutdown]
//! timeout_ms = 10000
//!
//! [exchange]
//! timeout_ms = 1000
//! heartbeat_ms = 60000
//! payload_bytes = 8388608
//! share_connections = 1
//! ```

pub mod defaults;
pub mod infra;
pub mod loader;

pub use defaults::ExchangeDefaults;
pub use infra::{BindConfig, InfraConfig, ShutdownConfig, TelemetryConfig};
pub use loader::{ConfigSources, discover_config_files_with_override};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete process configuration for the dubbo exchange core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DubboConfig {
    /// Infrastructure - cannot change at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Exchange defaults - seed per-call `EndpointUrl` parameters.
    #[serde(default)]
    pub exchange: ExchangeDefaults,
}

impl DubboConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/dubbo-exchange/config.toml`
    /// 3. `~/.config/dubbo-exchange/config.toml`
    /// 4. `./dubbo-exchange.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./dubbo-exchange.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = DubboConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# dubbo exchange core configuration\n\n");

        output.push_str("[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.infra.bind.host));
        output.push_str(&format!("port = {}\n", self.infra.bind.port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.infra.telemetry.otlp_endpoint
        ));
        output.push_str(&format!("log_level = \"{}\"\n", self.infra.telemetry.log_level));

        output.push_str("\n[shutdown]\n");
        output.push_str(&format!("timeout_ms = {}\n", self.infra.shutdown.timeout_ms));

        output.push_str("\n[exchange]\n");
        output.push_str(&format!("timeout_ms = {}\n", self.exchange.timeout_ms));
        output.push_str(&format!("heartbeat_ms = {}\n", self.exchange.heartbeat_ms));
        output.push_str(&format!("payload_bytes = {}\n", self.exchange.payload_bytes));
        output.push_str(&format!("accepts = {}\n", self.exchange.accepts));
        output.push_str(&format!(
            "share_connections = {}\n",
            self.exchange.share_connections
        ));
        output.push_str(&format!("codec = \"{}\"\n", self.exchange.codec));
        output.push_str(&format!("serialization = \"{}\"\n", self.exchange.serialization));
        output.push_str(&format!("client = \"{}\"\n", self.exchange.client));
        output.push_str(&format!("server = \"{}\"\n", self.exchange.server));
        output.push_str(&format!(
            "channel_readonly_sent = {}\n",
            self.exchange.channel_readonly_sent
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DubboConfig::default();
        assert_eq!(config.infra.bind.port, 20880);
        assert_eq!(config.exchange.timeout_ms, 1000);
    }

    #[test]
    fn test_to_toml() {
        let config = DubboConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[bind]"));
        assert!(toml.contains("[exchange]"));
        assert!(toml.contains("share_connections"));
    }

    #[test]
    fn test_load_defaults() {
        // Load should work even with no config files present.
        let config = DubboConfig::load().unwrap();
        assert_eq!(config.infra.bind.port, 20880);
    }
}
