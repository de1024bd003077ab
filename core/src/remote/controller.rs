use std::collections::HashMap;
use std::sync::Arc;

use kernelscout_protocol::ServerId;
use tokio::sync::Mutex;
use tracing::debug;

use super::RemoteFinderShared;
use super::RemoteKernelFinder;
use crate::capabilities::ServerConnectionInfo;
use crate::config::RemoteFinderConfig;
use crate::finder::KernelFinder;

/// Owns one activated [`RemoteKernelFinder`] per configured server and
/// keeps the aggregator's source list in step with the server set.
pub struct RemoteFinderController {
    finder: Arc<KernelFinder>,
    config: RemoteFinderConfig,
    shared: RemoteFinderShared,
    servers: Mutex<HashMap<ServerId, Arc<RemoteKernelFinder>>>,
}

impl RemoteFinderController {
    pub fn new(
        finder: Arc<KernelFinder>,
        config: RemoteFinderConfig,
        shared: RemoteFinderShared,
    ) -> Self {
        Self {
            finder,
            config,
            shared,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Builds, activates, and registers a finder for the server. Adding a
    /// server twice returns the existing finder untouched.
    pub async fn add_server(&self, server: ServerConnectionInfo) -> Arc<RemoteKernelFinder> {
        let mut servers = self.servers.lock().await;
        if let Some(existing) = servers.get(&server.server_id) {
            return existing.clone();
        }
        debug!("registering remote kernel server {}", server.display_name);
        let finder =
            RemoteKernelFinder::new(server.clone(), self.config.clone(), self.shared.clone());
        finder.activate().await;
        self.finder.register(finder.clone()).await;
        servers.insert(server.server_id, finder.clone());
        finder
    }

    /// Disposes the server's finder. The aggregator keeps the disposed
    /// source; it reports ready and lists nothing from then on. Unknown ids
    /// are ignored.
    pub async fn remove_server(&self, server_id: &ServerId) {
        let removed = self.servers.lock().await.remove(server_id);
        if let Some(finder) = removed {
            debug!(
                "removing remote kernel server {}",
                finder.server().display_name
            );
            finder.dispose().await;
        }
    }

    pub async fn finder_for(&self, server_id: &ServerId) -> Option<Arc<RemoteKernelFinder>> {
        self.servers.lock().await.get(server_id).cloned()
    }

    pub async fn server_ids(&self) -> Vec<ServerId> {
        self.servers.lock().await.keys().cloned().collect()
    }
}
