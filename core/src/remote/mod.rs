mod controller;
mod fetch;

pub use controller::RemoteFinderController;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::KernelConnection;
use kernelscout_protocol::SourceId;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::capabilities::InterpreterLookup;
use crate::capabilities::ServerConnectionInfo;
use crate::capabilities::SessionManagerProvider;
use crate::capabilities::SessionValidator;
use crate::config::RemoteFinderConfig;
use crate::error::Result;
use crate::error::ScoutError;
use crate::lifecycle::KernelLifecycleEvent;
use crate::lifecycle::KernelLifecycleHub;
use crate::source::DiscoverySource;
use crate::source::SourceKind;
use crate::store::CachedCandidates;
use crate::store::CandidateStore;

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// Lifecycle of a per-server finder. Every refresh after the initial load
/// passes through `Refreshing` and settles back on `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderStatus {
    Idle,
    Loading,
    Ready,
    Refreshing,
}

/// Live-session ids the host wants hidden, e.g. sessions the user shut
/// down that the server still reports. Clones share one set.
#[derive(Debug, Clone, Default)]
pub struct SessionExclusions {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl SessionExclusions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, id: impl Into<String>) {
        self.inner.write().await.insert(id.into());
    }

    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains(id)
    }

    pub(crate) async fn snapshot(&self) -> HashSet<String> {
        self.inner.read().await.clone()
    }
}

/// Collaborators shared by every per-server finder.
#[derive(Clone)]
pub struct RemoteFinderShared {
    pub sessions: Arc<dyn SessionManagerProvider>,
    pub store: Arc<dyn CandidateStore>,
    pub validator: Arc<dyn SessionValidator>,
    pub interpreters: Option<Arc<dyn InterpreterLookup>>,
    pub exclusions: SessionExclusions,
    pub lifecycle: KernelLifecycleHub,
}

#[derive(Default)]
struct FinderState {
    candidates: Vec<KernelConnection>,
    refresh: Option<CancellationToken>,
    disposal_timer: Option<JoinHandle<()>>,
    lifecycle_task: Option<JoinHandle<()>>,
    activated: bool,
    disposed: bool,
}

/// Caching discovery source for one remote server.
///
/// Serves the possibly-stale cache synchronously and refreshes it from the
/// live server in the background. Refreshes are single-flight: starting a
/// new one stores its cancellation token first and then cancels the
/// previous token, so a late callback can never observe an empty slot.
pub struct RemoteKernelFinder {
    server: ServerConnectionInfo,
    config: RemoteFinderConfig,
    shared: RemoteFinderShared,
    state: Mutex<FinderState>,
    status_tx: watch::Sender<FinderStatus>,
    ready_tx: watch::Sender<bool>,
    changed_tx: broadcast::Sender<()>,
}

impl RemoteKernelFinder {
    pub fn new(
        server: ServerConnectionInfo,
        config: RemoteFinderConfig,
        shared: RemoteFinderShared,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(FinderStatus::Idle);
        let (ready_tx, _) = watch::channel(false);
        let (changed_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new(Self {
            server,
            config,
            shared,
            state: Mutex::new(FinderState::default()),
            status_tx,
            ready_tx,
            changed_tx,
        })
    }

    pub fn server(&self) -> &ServerConnectionInfo {
        &self.server
    }

    pub fn status(&self) -> FinderStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FinderStatus> {
        self.status_tx.subscribe()
    }

    /// Current cache contents without waiting for readiness.
    pub async fn cached_candidates(&self) -> Vec<KernelConnection> {
        self.state.lock().await.candidates.clone()
    }

    /// Starts the initial cache load and the lifecycle subscription.
    /// Must run before the finder is registered with an aggregator, since
    /// readiness only resolves once the initial load settles.
    pub async fn activate(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.activated || state.disposed {
                return;
            }
            state.activated = true;

            let mut events = self.shared.lifecycle.subscribe();
            let weak = Arc::downgrade(self);
            state.lifecycle_task = Some(tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            let Some(finder) = weak.upgrade() else {
                                break;
                            };
                            finder.handle_lifecycle_event(event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        // Initial load runs in the background; its failures are logged and
        // otherwise swallowed so activation never blocks on the network.
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(finder) = weak.upgrade() else {
                return;
            };
            finder.load_cache().await;
        });
    }

    /// Forces a refresh now, outside of any lifecycle trigger.
    pub async fn refresh(self: &Arc<Self>) {
        self.spawn_refresh().await;
    }

    /// Makes the finder inert: cancels the in-flight refresh, aborts the
    /// pending disposal timer, and empties the served cache.
    pub async fn dispose(&self) {
        let refresh = {
            let mut state = self.state.lock().await;
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.candidates.clear();
            if let Some(timer) = state.disposal_timer.take() {
                timer.abort();
            }
            if let Some(task) = state.lifecycle_task.take() {
                task.abort();
            }
            state.refresh.take()
        };
        if let Some(refresh) = refresh {
            refresh.cancel();
        }
        // A disposed source must not block aggregator readiness waits.
        // `send_replace` latches the value even when no waiter has
        // subscribed yet; a plain `send` would be dropped then.
        self.ready_tx.send_replace(true);
    }

    async fn handle_lifecycle_event(self: &Arc<Self>, event: KernelLifecycleEvent) {
        match event {
            KernelLifecycleEvent::Started(connection) if connection.is_remote() => {
                debug!(
                    "remote kernel started, refreshing kernel cache for {}",
                    self.server.display_name
                );
                self.spawn_refresh().await;
            }
            KernelLifecycleEvent::Disposed(connection) if connection.is_remote() => {
                self.schedule_debounced_refresh().await;
            }
            _ => {}
        }
    }

    /// Refresh after the disposal debounce window. A disposal inside the
    /// window aborts and replaces the pending timer instead of stacking a
    /// second refresh.
    async fn schedule_debounced_refresh(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.disposed {
            return;
        }
        if let Some(timer) = state.disposal_timer.take() {
            timer.abort();
        }
        let weak = Arc::downgrade(self);
        let delay = self.config.disposal_debounce();
        state.disposal_timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let Some(finder) = weak.upgrade() else {
                return;
            };
            finder.spawn_refresh().await;
        }));
    }

    async fn spawn_refresh(self: &Arc<Self>) {
        let Some(token) = self.begin_refresh().await else {
            return;
        };
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(finder) = weak.upgrade() else {
                return;
            };
            finder.update_cache(&token).await;
            finder.finish_refresh(&token);
        });
    }

    /// Claims the single refresh slot. The new token is stored before the
    /// previous one is cancelled.
    async fn begin_refresh(&self) -> Option<CancellationToken> {
        let token = CancellationToken::new();
        let previous = {
            let mut state = self.state.lock().await;
            if state.disposed {
                return None;
            }
            state.refresh.replace(token.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        self.status_tx.send_if_modified(|status| {
            if *status == FinderStatus::Ready {
                *status = FinderStatus::Refreshing;
                true
            } else {
                false
            }
        });
        Some(token)
    }

    fn finish_refresh(&self, token: &CancellationToken) {
        // A superseded refresh was cancelled by its replacement and must
        // not flip the status under the newer pass.
        if token.is_cancelled() {
            return;
        }
        self.status_tx.send_if_modified(|status| {
            if *status == FinderStatus::Refreshing {
                *status = FinderStatus::Ready;
                true
            } else {
                false
            }
        });
    }

    /// Settles the initial load: the status leaves `Loading` and readiness
    /// waits resolve.
    fn mark_ready(&self) {
        self.status_tx.send_if_modified(|status| {
            if *status == FinderStatus::Loading {
                *status = FinderStatus::Ready;
                true
            } else {
                false
            }
        });
        // Latched via `send_replace` so readiness is observable by waiters
        // that subscribe after the initial load has already settled.
        self.ready_tx.send_replace(true);
    }

    /// First population of the cache. Non-empty validated cache contents
    /// are served immediately with a refresh kicked off in the background;
    /// an empty cache waits for one live fetch instead, with no fallback.
    async fn load_cache(self: &Arc<Self>) {
        self.status_tx.send_if_modified(|status| {
            if *status == FinderStatus::Idle {
                *status = FinderStatus::Loading;
                true
            } else {
                false
            }
        });

        let cached = self.validated_cache_read().await;
        if cached.is_empty() {
            if let Some(token) = self.begin_refresh().await {
                match self.fetch_live(&token).await {
                    Ok(candidates) => {
                        if !token.is_cancelled() {
                            self.write_cache(candidates).await;
                        }
                    }
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => {
                        warn!(
                            "initial kernel fetch from {} failed: {err}",
                            self.server.display_name
                        );
                    }
                }
                self.finish_refresh(&token);
            }
        } else {
            self.write_cache(cached).await;
            self.spawn_refresh().await;
        }
        self.mark_ready();
    }

    /// One refresh pass: live fetch, falling back to the validated cache
    /// when the server is unreachable. A cancelled pass writes nothing.
    async fn update_cache(&self, token: &CancellationToken) {
        let candidates = match self.fetch_live(token).await {
            Ok(candidates) => candidates,
            Err(err) if err.is_cancelled() => return,
            Err(err) => {
                warn!(
                    "kernel refresh for {} failed: {err}; serving validated cache",
                    self.server.display_name
                );
                self.validated_cache_read().await
            }
        };
        if token.is_cancelled() {
            return;
        }
        self.write_cache(candidates).await;
    }

    /// Cache contents that are safe to serve without a live fetch: live
    /// sessions that still pass the validator. Spec entries exist in the
    /// persisted structure for symmetry but are never served from cache.
    async fn validated_cache_read(&self) -> Vec<KernelConnection> {
        let mut candidates = self.state.lock().await.candidates.clone();
        if candidates.is_empty() {
            candidates = self.read_store().await;
        }
        let mut valid = Vec::new();
        for candidate in candidates {
            let KernelConnection::LiveRemoteSession(live) = &candidate else {
                continue;
            };
            if self.shared.validator.is_valid(live).await {
                valid.push(candidate);
            }
        }
        valid
    }

    async fn read_store(&self) -> Vec<KernelConnection> {
        let key = self.config.cache_key(&self.server.server_id);
        match self.shared.store.read(&key).await {
            Ok(Some(entry)) => entry.take_if_version(&self.config.schema_version),
            Ok(None) => Vec::new(),
            Err(err) => {
                let err = ScoutError::store(err);
                warn!(
                    "reading kernel cache for {} failed: {err}",
                    self.server.display_name
                );
                Vec::new()
            }
        }
    }

    /// The only path that mutates the served cache and the only path that
    /// fires the change notification. Memory and store stay in sync.
    async fn write_cache(&self, candidates: Vec<KernelConnection>) {
        {
            let mut state = self.state.lock().await;
            if state.disposed {
                return;
            }
            state.candidates = candidates.clone();
        }
        let key = self.config.cache_key(&self.server.server_id);
        let entry = CachedCandidates::new(self.config.schema_version.clone(), candidates);
        if let Err(err) = self.shared.store.write(&key, &entry).await {
            let err = ScoutError::store(err);
            warn!(
                "persisting kernel cache for {} failed: {err}",
                self.server.display_name
            );
        }
        let _ = self.changed_tx.send(());
    }
}

#[async_trait]
impl DiscoverySource for RemoteKernelFinder {
    fn id(&self) -> SourceId {
        SourceId::new(format!("remote-{}", self.server.server_id))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    fn display_name(&self) -> String {
        self.server.display_name.clone()
    }

    async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Remote kernels are document-agnostic; the scope is ignored and the
    /// current cache is served as-is.
    async fn list(&self, _scope: &DocumentScope) -> Result<Vec<KernelConnection>> {
        Ok(self.state.lock().await.candidates.clone())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changed_tx.subscribe()
    }
}
