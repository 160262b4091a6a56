//! `Invoker`, `Exporter`, and the process-wide service-key registry the
//! server-side dispatcher resolves incoming invocations against.

use crate::error::ExchangeError;
use crate::message::{Invocation, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// An opaque callable an exported service implements. The protocol
/// layer never inspects `invocation.arguments` itself - that's the
/// embedding application's job.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Response;
}

/// A handle registering one `Invoker` under a service-key. Dropping the
/// handle does not unexport - call `unexport` explicitly, matching the
/// source's lifecycle (`export` on the protocol, `unexport` or
/// `destroy` later, never on drop).
pub struct Exporter {
    pub service_key: String,
    pub invoker: Arc<dyn Invoker>,
    registry: ExporterRegistry,
}

impl Exporter {
    pub async fn unexport(&self) {
        self.registry.unexport(&self.service_key).await;
    }
}

struct RegistryInner {
    exporters: RwLock<HashMap<String, Arc<dyn Invoker>>>,
}

/// service-key -> exporter, 1:1. Exporting a key that's already taken
/// is a programming error, not a recoverable one - it surfaces
/// immediately rather than silently replacing the prior exporter.
#[derive(Clone)]
pub struct ExporterRegistry {
    inner: Arc<RegistryInner>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner { exporters: RwLock::new(HashMap::new()) }),
        }
    }

    pub async fn export(&self, service_key: String, invoker: Arc<dyn Invoker>) -> Result<Exporter, ExchangeError> {
        let mut exporters = self.inner.exporters.write().await;
        if exporters.contains_key(&service_key) {
            return Err(ExchangeError::Remoting {
                addr: service_key.clone(),
                message: format!("service already exported under key {service_key}"),
            });
        }
        info!(service_key = %service_key, "service exported");
        exporters.insert(service_key.clone(), invoker.clone());
        Ok(Exporter { service_key, invoker, registry: self.clone() })
    }

    pub async fn lookup(&self, service_key: &str) -> Option<Arc<dyn Invoker>> {
        self.inner.exporters.read().await.get(service_key).cloned()
    }

    pub async fn unexport(&self, service_key: &str) {
        if self.inner.exporters.write().await.remove(service_key).is_some() {
            info!(service_key = %service_key, "service unexported");
        }
    }

    pub async fn unexport_all(&self) {
        let mut exporters = self.inner.exporters.write().await;
        let keys: Vec<String> = exporters.keys().cloned().collect();
        exporters.clear();
        for key in keys {
            info!(service_key = %key, "service unexported on destroy");
        }
    }
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoInvoker;

    #[async_trait]
    impl Invoker for EchoInvoker {
        async fn invoke(&self, invocation: Invocation) -> Response {
            Response::ok(uuid::Uuid::new_v4(), serde_json::json!(invocation.method))
        }
    }

    #[tokio::test]
    async fn export_then_lookup_resolves_invoker() {
        let registry = ExporterRegistry::new();
        registry.export("com.acme.Echo:20880".to_string(), Arc::new(EchoInvoker)).await.unwrap();

        let invoker = registry.lookup("com.acme.Echo:20880").await.unwrap();
        let resp = invoker.invoke(Invocation::new("echo")).await;
        assert!(resp.status.is_ok());
    }

    #[tokio::test]
    async fn duplicate_export_is_an_error() {
        let registry = ExporterRegistry::new();
        registry.export("dup:20880".to_string(), Arc::new(EchoInvoker)).await.unwrap();
        let err = registry.export("dup:20880".to_string(), Arc::new(EchoInvoker)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Remoting { .. }));
    }

    #[tokio::test]
    async fn unexport_removes_entry() {
        let registry = ExporterRegistry::new();
        let exporter = registry.export("gone:20880".to_string(), Arc::new(EchoInvoker)).await.unwrap();
        exporter.unexport().await;
        assert!(registry.lookup("gone:20880").await.is_none());
    }
}
