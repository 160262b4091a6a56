//! Exchange defaults - seed per-call `EndpointUrl` parameters, then the URL
//! the caller constructs is the source of truth for that one call.

use serde::{Deserialize, Serialize};

/// Process-wide fallback values for parameters an `EndpointUrl` may omit.
///
/// None of these override a value a caller actually put on a URL; they
/// only fill gaps so a bare `dubbo://host:port/Service` still behaves
/// sensibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeDefaults {
    /// Per-request timeout in milliseconds.
    /// Default: 1000
    #[serde(default = "ExchangeDefaults::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Heartbeat interval in milliseconds.
    /// Default: 60000
    #[serde(default = "ExchangeDefaults::default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Maximum serialized payload size in bytes. Zero means unlimited.
    /// Default: 8388608 (8 MiB)
    #[serde(default = "ExchangeDefaults::default_payload_bytes")]
    pub payload_bytes: u32,

    /// Maximum concurrent channels a server accepts. Zero means unlimited.
    /// Default: 0
    #[serde(default = "ExchangeDefaults::default_accepts")]
    pub accepts: u32,

    /// Size of the shared client pool per endpoint when the URL does not
    /// request dedicated connections.
    /// Default: 1
    #[serde(default = "ExchangeDefaults::default_share_connections")]
    pub share_connections: u32,

    /// Named codec implementation.
    /// Default: "dubbo"
    #[serde(default = "ExchangeDefaults::default_codec")]
    pub codec: String,

    /// Named serialization implementation.
    /// Default: "hessian2"
    #[serde(default = "ExchangeDefaults::default_serialization")]
    pub serialization: String,

    /// Named client transport implementation.
    /// Default: "tokio"
    #[serde(default = "ExchangeDefaults::default_client")]
    pub client: String,

    /// Named server transport implementation.
    /// Default: "tokio"
    #[serde(default = "ExchangeDefaults::default_server")]
    pub server: String,

    /// Block server close until readonly notification is best-effort
    /// delivered to every channel.
    /// Default: true
    #[serde(default = "ExchangeDefaults::default_channel_readonly_sent")]
    pub channel_readonly_sent: bool,
}

impl ExchangeDefaults {
    fn default_timeout_ms() -> u64 {
        1000
    }

    fn default_heartbeat_ms() -> u64 {
        60_000
    }

    fn default_payload_bytes() -> u32 {
        8 * 1024 * 1024
    }

    fn default_accepts() -> u32 {
        0
    }

    fn default_share_connections() -> u32 {
        1
    }

    fn default_codec() -> String {
        "dubbo".to_string()
    }

    fn default_serialization() -> String {
        "hessian2".to_string()
    }

    fn default_client() -> String {
        "tokio".to_string()
    }

    fn default_server() -> String {
        "tokio".to_string()
    }

    fn default_channel_readonly_sent() -> bool {
        true
    }
}

impl Default for ExchangeDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            heartbeat_ms: Self::default_heartbeat_ms(),
            payload_bytes: Self::default_payload_bytes(),
            accepts: Self::default_accepts(),
            share_connections: Self::default_share_connections(),
            codec: Self::default_codec(),
            serialization: Self::default_serialization(),
            client: Self::default_client(),
            server: Self::default_server(),
            channel_readonly_sent: Self::default_channel_readonly_sent(),
        }
    }
}
