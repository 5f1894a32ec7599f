use crate::domain::ids::ConnectorId;
use crate::domain::ports::PluginRef;
use crate::error::EngineError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RegisteredConnector {
    pub plugin: PluginRef,
    pub polling_period: Duration,
}

/// Plugins installed in the engine, by connector.
#[derive(Default, Clone)]
pub struct Connectors {
    installed: Arc<RwLock<HashMap<ConnectorId, RegisteredConnector>>>,
}

impl Connectors {
    pub async fn register(&self, connector_id: ConnectorId, connector: RegisteredConnector) {
        self.installed.write().await.insert(connector_id, connector);
    }

    pub async fn unregister(&self, connector_id: &ConnectorId) -> Option<RegisteredConnector> {
        self.installed.write().await.remove(connector_id)
    }

    pub async fn get(&self, connector_id: &ConnectorId) -> Result<RegisteredConnector, EngineError> {
        self.installed
            .read()
            .await
            .get(connector_id)
            .cloned()
            .ok_or_else(|| EngineError::ConnectorNotFound(connector_id.clone()))
    }

    pub async fn is_registered(&self, connector_id: &ConnectorId) -> bool {
        self.installed.read().await.contains_key(connector_id)
    }
}
