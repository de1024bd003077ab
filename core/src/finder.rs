use std::sync::Arc;

use futures::future::join_all;
use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::SourceInfo;
use kernelscout_protocol::SourcedCandidate;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::source::DiscoverySource;
use crate::source::SourceKind;

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// Aggregates every registered discovery source behind one interface.
///
/// The source list is append-only; removing a server is expressed by
/// disposing its source, which then reports ready and lists nothing.
pub struct KernelFinder {
    sources: Mutex<Vec<Arc<dyn DiscoverySource>>>,
    changed_tx: broadcast::Sender<()>,
}

impl KernelFinder {
    pub fn new() -> Self {
        let (changed_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            sources: Mutex::new(Vec::new()),
            changed_tx,
        }
    }

    /// Appends a source and starts re-emitting its change events into the
    /// aggregate stream. The forwarder exits when the source's channel
    /// closes.
    pub async fn register(&self, source: Arc<dyn DiscoverySource>) {
        let mut rx = source.subscribe_changes();
        let tx = self.changed_tx.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(()) => {
                        let _ = tx.send(());
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.sources.lock().await.push(source);
    }

    /// Source identities in registration order.
    pub async fn source_info(&self) -> Vec<SourceInfo> {
        self.sources
            .lock()
            .await
            .iter()
            .map(|source| source.source_info())
            .collect()
    }

    /// Fires whenever any registered source changes. The event carries no
    /// payload; consumers re-query `list_all`.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changed_tx.subscribe()
    }

    /// Candidates from every source, stamped with their origin.
    pub async fn list_all(
        &self,
        scope: &DocumentScope,
        token: &CancellationToken,
    ) -> Vec<SourcedCandidate> {
        self.list_filtered(None, scope, token).await
    }

    /// Candidates from sources of one kind only.
    pub async fn list_kind(
        &self,
        kind: SourceKind,
        scope: &DocumentScope,
        token: &CancellationToken,
    ) -> Vec<SourcedCandidate> {
        self.list_filtered(Some(kind), scope, token).await
    }

    async fn list_filtered(
        &self,
        kind: Option<SourceKind>,
        scope: &DocumentScope,
        token: &CancellationToken,
    ) -> Vec<SourcedCandidate> {
        let sources: Vec<Arc<dyn DiscoverySource>> = self
            .sources
            .lock()
            .await
            .iter()
            .filter(|source| kind.is_none_or(|kind| source.kind() == kind))
            .cloned()
            .collect();

        // Readiness is awaited for all sources at once so one slow initial
        // load does not serialize behind another.
        join_all(sources.iter().map(|source| source.wait_ready())).await;

        // Checked once, after readiness. Queries already started below are
        // never aborted; a late cancellation is simply ignored by callers.
        if token.is_cancelled() {
            return Vec::new();
        }

        let results = join_all(sources.iter().map(|source| source.list(scope))).await;

        let mut candidates = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(connections) => {
                    let info = source.source_info();
                    candidates.extend(connections.into_iter().map(|connection| SourcedCandidate {
                        connection,
                        source: info.clone(),
                    }));
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    warn!("kernel source {} failed to list: {err}", source.id());
                }
            }
        }
        candidates
    }
}

impl Default for KernelFinder {
    fn default() -> Self {
        Self::new()
    }
}
