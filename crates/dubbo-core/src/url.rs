//! Endpoint URL: the opaque key/value configuration every transport,
//! exchange, and protocol operation is parameterized by.

use dubbo_conf::ExchangeDefaults;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Parsed endpoint configuration. Immutable once constructed; a "reset"
/// produces a new `EndpointUrl` rather than mutating in place, since
/// several derived components (the accept limit, the worker pool size)
/// are only recomputed at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    pub host: String,
    pub port: u16,
    params: HashMap<String, String>,
}

impl EndpointUrl {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            params: HashMap::new(),
        }
    }

    /// Build from explicit parameters, falling back to `defaults` for
    /// anything not present. Mirrors how a consumer builds a URL from a
    /// registry entry plus process-wide `ExchangeDefaults`.
    pub fn with_defaults(host: impl Into<String>, port: u16, defaults: &ExchangeDefaults) -> Self {
        Self::new(host, port)
            .with_param("timeout", defaults.timeout_ms.to_string())
            .with_param("heartbeat", defaults.heartbeat_ms.to_string())
            .with_param("payload", defaults.payload_bytes.to_string())
            .with_param("accepts", defaults.accepts.to_string())
            .with_param("share-connections", defaults.share_connections.to_string())
            .with_param("codec", defaults.codec.clone())
            .with_param("serialization", defaults.serialization.clone())
            .with_param("client", defaults.client.clone())
            .with_param("server", defaults.server.clone())
            .with_param(
                "channel.readonly.sent",
                defaults.channel_readonly_sent.to_string(),
            )
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn socket_addr(&self) -> std::io::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    }

    pub fn path(&self) -> Option<&str> {
        self.param("path")
    }

    pub fn version(&self) -> Option<&str> {
        self.param("version")
    }

    pub fn group(&self) -> Option<&str> {
        self.param("group")
    }

    pub fn anyhost(&self) -> bool {
        self.param("anyhost").map(|v| v == "true").unwrap_or(false)
    }

    pub fn lazy(&self) -> bool {
        self.param("lazy").map(|v| v == "true").unwrap_or(false)
    }

    fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.param(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn param_u32(&self, key: &str, default: u32) -> u32 {
        self.param(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.param_u64("timeout", 1000)
    }

    pub fn heartbeat_ms(&self) -> u64 {
        self.param_u64("heartbeat", 60_000)
    }

    pub fn payload_bytes(&self) -> u32 {
        self.param_u32("payload", 8 * 1024 * 1024)
    }

    pub fn accepts(&self) -> u32 {
        self.param_u32("accepts", 0)
    }

    pub fn connections(&self) -> u32 {
        self.param_u32("connections", 0)
    }

    pub fn share_connections(&self) -> u32 {
        self.param_u32("share-connections", 1)
    }

    pub fn codec(&self) -> &str {
        self.param("codec").unwrap_or("dubbo")
    }

    pub fn serialization(&self) -> &str {
        self.param("serialization").unwrap_or("json")
    }

    pub fn channel_readonly_sent(&self) -> bool {
        self.param("channel.readonly.sent")
            .map(|v| v == "true")
            .unwrap_or(true)
    }

    /// The unique key of a server-side exporter: `{group/}{path}{:version}:{port}`.
    pub fn service_key(&self) -> String {
        self.service_key_with_port(self.port)
    }

    /// As `service_key`, but with an explicit port override - used when a
    /// stub event must be keyed by remote port instead of local port.
    pub fn service_key_with_port(&self, port: u16) -> String {
        build_service_key(self.group(), self.path().unwrap_or(""), self.version(), port)
    }

    /// The `host:port` key the reference-counted client pool groups
    /// connections by.
    pub fn endpoint_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The unique key of a server-side exporter: `{group/}{path}{:version}:{port}`.
/// Shared by `EndpointUrl::service_key` (keyed off URL params) and the
/// protocol dispatcher (keyed off an inbound invocation's attachments) so
/// both sides of the wire agree on the same string.
pub fn build_service_key(group: Option<&str>, path: &str, version: Option<&str>, port: u16) -> String {
    let mut key = String::new();
    if let Some(group) = group {
        key.push_str(group);
        key.push('/');
    }
    key.push_str(path);
    if let Some(version) = version {
        key.push(':');
        key.push_str(version);
    }
    key.push(':');
    key.push_str(&port.to_string());
    key
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dubbo://{}:{}", self.host, self.port)?;
        if let Some(path) = self.path() {
            write!(f, "/{}", path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_key_with_group_and_version() {
        let url = EndpointUrl::new("127.0.0.1", 20880)
            .with_param("path", "com.acme.Echo")
            .with_param("version", "1.0.0")
            .with_param("group", "prod");
        assert_eq!(url.service_key(), "prod/com.acme.Echo:1.0.0:20880");
    }

    #[test]
    fn service_key_without_group_or_version() {
        let url = EndpointUrl::new("127.0.0.1", 20880).with_param("path", "com.acme.Echo");
        assert_eq!(url.service_key(), "com.acme.Echo:20880");
    }

    #[test]
    fn defaults_seed_missing_params() {
        let defaults = ExchangeDefaults::default();
        let url = EndpointUrl::with_defaults("127.0.0.1", 20880, &defaults);
        assert_eq!(url.timeout_ms(), defaults.timeout_ms);
        assert_eq!(url.share_connections(), defaults.share_connections);
    }

    #[test]
    fn explicit_param_overrides_default() {
        let defaults = ExchangeDefaults::default();
        let url = EndpointUrl::with_defaults("127.0.0.1", 20880, &defaults)
            .with_param("timeout", "500");
        assert_eq!(url.timeout_ms(), 500);
    }

    #[test]
    fn endpoint_key_groups_by_host_and_port() {
        let url = EndpointUrl::new("10.0.0.1", 20880);
        assert_eq!(url.endpoint_key(), "10.0.0.1:20880");
    }
}
