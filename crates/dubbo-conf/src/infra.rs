//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};

/// Network bind address for this process's transport server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// Host to bind. Empty string or "0.0.0.0" binds all interfaces.
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Port to bind.
    /// Default: 20880 (the conventional dubbo provider port)
    #[serde(default = "BindConfig::default_port")]
    pub port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        20880
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry, if tracing export is wired up
    /// by the embedding binary. The exchange core itself only emits
    /// `tracing` events; shipping them anywhere is the binary's job.
    /// Default: 127.0.0.1:4317
    #[serde(default = "TelemetryConfig::default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Log level (trace, debug, info, warn, error), or an `EnvFilter` string.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_otlp_endpoint() -> String {
        "127.0.0.1:4317".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: Self::default_otlp_endpoint(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Graceful-shutdown timing for the transport server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Milliseconds to wait for in-flight calls to drain before forcing
    /// channels closed.
    /// Default: 10000
    #[serde(default = "ShutdownConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ShutdownConfig {
    fn default_timeout_ms() -> u64 {
        10_000
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Network bind address.
    #[serde(default)]
    pub bind: BindConfig,

    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Graceful shutdown timing.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_defaults() {
        let bind = BindConfig::default();
        assert_eq!(bind.host, "0.0.0.0");
        assert_eq!(bind.port, 20880);
    }

    #[test]
    fn test_telemetry_defaults() {
        let telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.otlp_endpoint, "127.0.0.1:4317");
        assert_eq!(telemetry.log_level, "info");
    }

    #[test]
    fn test_shutdown_defaults() {
        let shutdown = ShutdownConfig::default();
        assert_eq!(shutdown.timeout_ms, 10_000);
    }
}
