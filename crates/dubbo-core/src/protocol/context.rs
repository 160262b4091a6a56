//! `Context`: the explicit, non-global bundle of state a `DubboProtocol`
//! instance owns - the exporter map, the server map, and the
//! per-endpoint client pool. Tests build a fresh `Context` per test
//! rather than reaching for process-wide statics.

use super::exporter::ExporterRegistry;
use crate::error::ExchangeError;
use crate::exchange::ExchangeServer;
use crate::pool::ClientPool;
use crate::transport::Handler;
use crate::url::EndpointUrl;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Context {
    pub(crate) exporters: ExporterRegistry,
    servers: RwLock<HashMap<String, Arc<ExchangeServer>>>,
    pub(crate) pool: ClientPool,
}

impl Context {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            exporters: ExporterRegistry::new(),
            servers: RwLock::new(HashMap::new()),
            pool: ClientPool::new(),
        })
    }

    pub fn exporters(&self) -> &ExporterRegistry {
        &self.exporters
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    /// Double-checked get-or-bind: one listening `ExchangeServer` per
    /// `host:port`, shared across every service exported on that
    /// address.
    pub(crate) async fn server_for(
        &self,
        url: &EndpointUrl,
        app_handler: Arc<dyn Handler>,
    ) -> Result<Arc<ExchangeServer>, ExchangeError> {
        let key = url.endpoint_key();
        if let Some(server) = self.servers.read().await.get(&key) {
            return Ok(server.clone());
        }

        let mut servers = self.servers.write().await;
        if let Some(server) = servers.get(&key) {
            return Ok(server.clone());
        }

        let server = ExchangeServer::bind(url.clone(), app_handler).await?;
        servers.insert(key, server.clone());
        Ok(server)
    }

    pub async fn destroy(&self, shutdown_timeout: std::time::Duration) {
        self.exporters.unexport_all().await;
        let mut servers = self.servers.write().await;
        for (_, server) in servers.drain() {
            server.close_graceful(shutdown_timeout).await;
        }
    }
}
