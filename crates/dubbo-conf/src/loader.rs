//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, DubboConfig, ExchangeDefaults, InfraConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/dubbo-exchange/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("dubbo-exchange/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("dubbo-exchange.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<DubboConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<DubboConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut infra = InfraConfig::default();
    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            infra.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("port").and_then(|v| v.as_integer()) {
            infra.bind.port = v as u16;
        }
    }
    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            infra.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            infra.telemetry.log_level = v.to_string();
        }
    }
    if let Some(shutdown) = table.get("shutdown").and_then(|v| v.as_table()) {
        if let Some(v) = shutdown.get("timeout_ms").and_then(|v| v.as_integer()) {
            infra.shutdown.timeout_ms = v as u64;
        }
    }

    let mut exchange = ExchangeDefaults::default();
    if let Some(e) = table.get("exchange").and_then(|v| v.as_table()) {
        if let Some(v) = e.get("timeout_ms").and_then(|v| v.as_integer()) {
            exchange.timeout_ms = v as u64;
        }
        if let Some(v) = e.get("heartbeat_ms").and_then(|v| v.as_integer()) {
            exchange.heartbeat_ms = v as u64;
        }
        if let Some(v) = e.get("payload_bytes").and_then(|v| v.as_integer()) {
            exchange.payload_bytes = v as u32;
        }
        if let Some(v) = e.get("accepts").and_then(|v| v.as_integer()) {
            exchange.accepts = v as u32;
        }
        if let Some(v) = e.get("share_connections").and_then(|v| v.as_integer()) {
            exchange.share_connections = v as u32;
        }
        if let Some(v) = e.get("codec").and_then(|v| v.as_str()) {
            exchange.codec = v.to_string();
        }
        if let Some(v) = e.get("serialization").and_then(|v| v.as_str()) {
            exchange.serialization = v.to_string();
        }
        if let Some(v) = e.get("client").and_then(|v| v.as_str()) {
            exchange.client = v.to_string();
        }
        if let Some(v) = e.get("server").and_then(|v| v.as_str()) {
            exchange.server = v.to_string();
        }
        if let Some(v) = e.get("channel_readonly_sent").and_then(|v| v.as_bool()) {
            exchange.channel_readonly_sent = v;
        }
    }

    Ok(DubboConfig { infra, exchange })
}

/// Merge two configs, with `overlay` taking precedence field-by-field.
pub fn merge_configs(base: DubboConfig, overlay: DubboConfig) -> DubboConfig {
    let infra_default = InfraConfig::default();
    let exchange_default = ExchangeDefaults::default();

    DubboConfig {
        infra: InfraConfig {
            bind: crate::infra::BindConfig {
                host: if overlay.infra.bind.host != infra_default.bind.host {
                    overlay.infra.bind.host
                } else {
                    base.infra.bind.host
                },
                port: if overlay.infra.bind.port != infra_default.bind.port {
                    overlay.infra.bind.port
                } else {
                    base.infra.bind.port
                },
            },
            telemetry: crate::infra::TelemetryConfig {
                otlp_endpoint: if overlay.infra.telemetry.otlp_endpoint != infra_default.telemetry.otlp_endpoint {
                    overlay.infra.telemetry.otlp_endpoint
                } else {
                    base.infra.telemetry.otlp_endpoint
                },
                log_level: if overlay.infra.telemetry.log_level != infra_default.telemetry.log_level {
                    overlay.infra.telemetry.log_level
                } else {
                    base.infra.telemetry.log_level
                },
            },
            shutdown: crate::infra::ShutdownConfig {
                timeout_ms: if overlay.infra.shutdown.timeout_ms != infra_default.shutdown.timeout_ms {
                    overlay.infra.shutdown.timeout_ms
                } else {
                    base.infra.shutdown.timeout_ms
                },
            },
        },
        exchange: ExchangeDefaults {
            timeout_ms: if overlay.exchange.timeout_ms != exchange_default.timeout_ms {
                overlay.exchange.timeout_ms
            } else {
                base.exchange.timeout_ms
            },
            heartbeat_ms: if overlay.exchange.heartbeat_ms != exchange_default.heartbeat_ms {
                overlay.exchange.heartbeat_ms
            } else {
                base.exchange.heartbeat_ms
            },
            payload_bytes: if overlay.exchange.payload_bytes != exchange_default.payload_bytes {
                overlay.exchange.payload_bytes
            } else {
                base.exchange.payload_bytes
            },
            accepts: if overlay.exchange.accepts != exchange_default.accepts {
                overlay.exchange.accepts
            } else {
                base.exchange.accepts
            },
            share_connections: if overlay.exchange.share_connections != exchange_default.share_connections {
                overlay.exchange.share_connections
            } else {
                base.exchange.share_connections
            },
            codec: if overlay.exchange.codec != exchange_default.codec {
                overlay.exchange.codec
            } else {
                base.exchange.codec
            },
            serialization: if overlay.exchange.serialization != exchange_default.serialization {
                overlay.exchange.serialization
            } else {
                base.exchange.serialization
            },
            client: if overlay.exchange.client != exchange_default.client {
                overlay.exchange.client
            } else {
                base.exchange.client
            },
            server: if overlay.exchange.server != exchange_default.server {
                overlay.exchange.server
            } else {
                base.exchange.server
            },
            channel_readonly_sent: if overlay.exchange.channel_readonly_sent != exchange_default.channel_readonly_sent {
                overlay.exchange.channel_readonly_sent
            } else {
                base.exchange.channel_readonly_sent
            },
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut DubboConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("DUBBO_BIND_HOST") {
        config.infra.bind.host = v;
        sources.env_overrides.push("DUBBO_BIND_HOST".to_string());
    }
    if let Ok(v) = env::var("DUBBO_BIND_PORT") {
        if let Ok(port) = v.parse() {
            config.infra.bind.port = port;
            sources.env_overrides.push("DUBBO_BIND_PORT".to_string());
        }
    }

    if let Ok(v) = env::var("DUBBO_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("DUBBO_OTLP_ENDPOINT".to_string());
    }
    // Also support the standard OTEL env var.
    if let Ok(v) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("DUBBO_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("DUBBO_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG, the ecosystem-standard name.
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("DUBBO_SHUTDOWN_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.infra.shutdown.timeout_ms = ms;
            sources.env_overrides.push("DUBBO_SHUTDOWN_TIMEOUT_MS".to_string());
        }
    }

    if let Ok(v) = env::var("DUBBO_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.exchange.timeout_ms = ms;
            sources.env_overrides.push("DUBBO_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("DUBBO_HEARTBEAT_MS") {
        if let Ok(ms) = v.parse() {
            config.exchange.heartbeat_ms = ms;
            sources.env_overrides.push("DUBBO_HEARTBEAT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("DUBBO_PAYLOAD_BYTES") {
        if let Ok(n) = v.parse() {
            config.exchange.payload_bytes = n;
            sources.env_overrides.push("DUBBO_PAYLOAD_BYTES".to_string());
        }
    }
    if let Ok(v) = env::var("DUBBO_ACCEPTS") {
        if let Ok(n) = v.parse() {
            config.exchange.accepts = n;
            sources.env_overrides.push("DUBBO_ACCEPTS".to_string());
        }
    }
    if let Ok(v) = env::var("DUBBO_SHARE_CONNECTIONS") {
        if let Ok(n) = v.parse() {
            config.exchange.share_connections = n;
            sources.env_overrides.push("DUBBO_SHARE_CONNECTIONS".to_string());
        }
    }
    if let Ok(v) = env::var("DUBBO_CODEC") {
        config.exchange.codec = v;
        sources.env_overrides.push("DUBBO_CODEC".to_string());
    }
    if let Ok(v) = env::var("DUBBO_SERIALIZATION") {
        config.exchange.serialization = v;
        sources.env_overrides.push("DUBBO_SERIALIZATION".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            return match env::var(var_name) {
                Ok(var_value) => PathBuf::from(var_value).join(&stripped[slash_pos + 1..]),
                Err(_) => PathBuf::from(path),
            };
        }
        return env::var(stripped)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(path));
    }

    PathBuf::from(path)
}
