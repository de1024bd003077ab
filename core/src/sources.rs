use std::sync::Arc;

use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::SourceId;
use kernelscout_protocol::SourceInfo;
use kernelscout_protocol::SourcedCandidate;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::capabilities::LocalDiscovery;
use crate::finder::KernelFinder;
use crate::source::SourceKind;

/// Coarse entry for a source-picker UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSourceEntry {
    pub id: SourceId,
    pub display_name: String,
    pub kind: SourceKind,
}

/// Flat registry of the two coarse kernel sources, "local" and "remote".
/// Pure composition over the aggregator and the optional local-discovery
/// capability; no caching of its own.
pub struct KernelSourceRegistry {
    finder: Arc<KernelFinder>,
    local: Option<Arc<dyn LocalDiscovery>>,
}

impl KernelSourceRegistry {
    pub fn new(finder: Arc<KernelFinder>, local: Option<Arc<dyn LocalDiscovery>>) -> Self {
        Self { finder, local }
    }

    /// Both entries are always listed; a missing local capability only
    /// affects what `list` returns.
    pub fn entries(&self) -> Vec<KernelSourceEntry> {
        vec![
            KernelSourceEntry {
                id: SourceId::new("local"),
                display_name: "Local kernels".to_string(),
                kind: SourceKind::Local,
            },
            KernelSourceEntry {
                id: SourceId::new("remote"),
                display_name: "Remote kernels".to_string(),
                kind: SourceKind::Remote,
            },
        ]
    }

    pub async fn list(
        &self,
        kind: SourceKind,
        scope: &DocumentScope,
        token: &CancellationToken,
    ) -> Vec<SourcedCandidate> {
        match kind {
            SourceKind::Local => {
                let Some(local) = self.local.as_ref() else {
                    return Vec::new();
                };
                if token.is_cancelled() {
                    return Vec::new();
                }
                match local.list(scope).await {
                    Ok(connections) => {
                        let info = SourceInfo {
                            id: SourceId::new("local"),
                            display_name: "Local kernels".to_string(),
                        };
                        connections
                            .into_iter()
                            .map(|connection| SourcedCandidate {
                                connection,
                                source: info.clone(),
                            })
                            .collect()
                    }
                    Err(err) => {
                        warn!("local kernel discovery failed: {err:#}");
                        Vec::new()
                    }
                }
            }
            SourceKind::Remote => {
                self.finder.list_kind(SourceKind::Remote, scope, token).await
            }
        }
    }
}
