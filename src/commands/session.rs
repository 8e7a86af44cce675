use farmsync::identity::{fetch_identity, IdentityProvider};
use farmsync::store::RemoteStore;
use farmsync::sync::{FarmDataSync, InventorySync};
use std::sync::Arc;

use crate::config::Config;

/// A signed-in connection to the store server.
pub struct Session {
    identity: IdentityProvider,
    store: Arc<RemoteStore>,
}

impl Session {
    /// Resolves who the API key belongs to and opens the store connection.
    pub async fn connect(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let api_key = config.require_api_key()?;
        let server_url = config.server_url.value.as_str();
        let timeout = config.connect_timeout();

        let user = fetch_identity(server_url, api_key, timeout).await?;
        tracing::debug!(user = %user, "resolved identity");
        let store = RemoteStore::connect(server_url, api_key, timeout).await?;

        Ok(Self {
            identity: IdentityProvider::with_user(user),
            store: Arc::new(store),
        })
    }

    pub fn farm(&self) -> FarmDataSync<RemoteStore> {
        FarmDataSync::spawn(Arc::clone(&self.store), self.identity.subscribe())
    }

    pub fn inventory(&self) -> InventorySync<RemoteStore> {
        InventorySync::spawn(Arc::clone(&self.store), self.identity.subscribe())
    }
}
