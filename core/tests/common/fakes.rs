//! Scripted stand-ins for every host capability the crate consumes.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::anyhow;
use async_trait::async_trait;
use kernelscout_core::RemoteFinderConfig;
use kernelscout_core::RemoteFinderShared;
use kernelscout_core::RemoteKernelFinder;
use kernelscout_core::ScoutError;
use kernelscout_core::ServerConnectionInfo;
use kernelscout_core::SessionExclusions;
use kernelscout_core::SourceKind;
use kernelscout_core::capabilities::CandidateRegistry;
use kernelscout_core::capabilities::InterpreterLookup;
use kernelscout_core::capabilities::LocalDiscovery;
use kernelscout_core::capabilities::RegisteredCandidate;
use kernelscout_core::capabilities::SelectionLedger;
use kernelscout_core::capabilities::SessionManagerHandle;
use kernelscout_core::capabilities::SessionManagerProvider;
use kernelscout_core::capabilities::SessionValidator;
use kernelscout_core::capabilities::TelemetrySink;
use kernelscout_core::capabilities::WorkspaceTrust;
use kernelscout_core::lifecycle::KernelLifecycleHub;
use kernelscout_core::source::DiscoverySource;
use kernelscout_core::store::CachedCandidates;
use kernelscout_core::store::CandidateStore;
use kernelscout_core::store::MemoryStore;
use kernelscout_protocol::Affinity;
use kernelscout_protocol::ConnectionId;
use kernelscout_protocol::DocumentId;
use kernelscout_protocol::DocumentKind;
use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::InterpreterInfo;
use kernelscout_protocol::KernelConnection;
use kernelscout_protocol::KernelSpecModel;
use kernelscout_protocol::LiveSessionConnection;
use kernelscout_protocol::MatchReason;
use kernelscout_protocol::PreferredOutcome;
use kernelscout_protocol::RunningKernelModel;
use kernelscout_protocol::SessionModel;
use kernelscout_protocol::SourceId;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::watch;

use crate::fixtures;

/// What one successful live fetch serves.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub kernels: Vec<RunningKernelModel>,
    pub specs: Vec<KernelSpecModel>,
    pub sessions: Vec<SessionModel>,
}

/// Releases a gated fetch. Dropping the handle releases it too.
pub struct GateHandle {
    tx: watch::Sender<bool>,
    entered_rx: watch::Receiver<bool>,
}

impl GateHandle {
    pub fn release(&self) {
        let _ = self.tx.send(true);
    }

    /// Resolves once the gated fetch has reached the gate and parked.
    pub async fn entered(&self) {
        let mut rx = self.entered_rx.clone();
        let _ = rx.wait_for(|entered| *entered).await;
    }
}

pub struct FetchGate {
    rx: watch::Receiver<bool>,
    entered_tx: watch::Sender<bool>,
}

impl FetchGate {
    async fn wait(mut self) {
        let _ = self.entered_tx.send(true);
        let _ = self.rx.wait_for(|open| *open).await;
    }
}

fn fetch_gate() -> (GateHandle, FetchGate) {
    let (tx, rx) = watch::channel(false);
    let (entered_tx, entered_rx) = watch::channel(false);
    (GateHandle { tx, entered_rx }, FetchGate { rx, entered_tx })
}

/// One scripted `connect` call.
pub enum PlannedConnect {
    Serve(FetchOutcome),
    /// Served only after the gate is released.
    ServeGated(FetchOutcome, FetchGate),
    FailConnect(String),
    /// Connects, then every list call fails. Exercises the
    /// dispose-on-error path.
    FailLists(String),
}

/// Session-manager fake driven by a queue of planned connects. An empty
/// queue serves the steady outcome, so background refreshes stay
/// deterministic.
#[derive(Default)]
pub struct ScriptedSessionManager {
    plan: Mutex<VecDeque<PlannedConnect>>,
    steady: StdMutex<FetchOutcome>,
    connects: AtomicUsize,
    disposals: Arc<AtomicUsize>,
}

impl ScriptedSessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push(&self, planned: PlannedConnect) {
        self.plan.lock().await.push_back(planned);
    }

    pub async fn push_fetch(&self, outcome: FetchOutcome) {
        self.push(PlannedConnect::Serve(outcome)).await;
    }

    pub async fn push_gated_fetch(&self, outcome: FetchOutcome) -> GateHandle {
        let (handle, gate) = fetch_gate();
        self.push(PlannedConnect::ServeGated(outcome, gate)).await;
        handle
    }

    pub async fn push_connect_error(&self, message: &str) {
        self.push(PlannedConnect::FailConnect(message.to_string())).await;
    }

    pub async fn push_lists_error(&self, message: &str) {
        self.push(PlannedConnect::FailLists(message.to_string())).await;
    }

    /// Outcome served whenever the queue is empty.
    pub fn set_steady(&self, outcome: FetchOutcome) {
        *self.steady.lock().unwrap() = outcome;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionManagerProvider for ScriptedSessionManager {
    async fn connect(
        &self,
        _server: &ServerConnectionInfo,
    ) -> anyhow::Result<Box<dyn SessionManagerHandle>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let planned = self
            .plan
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| PlannedConnect::Serve(self.steady.lock().unwrap().clone()));
        let (outcome, lists_error) = match planned {
            PlannedConnect::Serve(outcome) => (outcome, None),
            PlannedConnect::ServeGated(outcome, gate) => {
                gate.wait().await;
                (outcome, None)
            }
            PlannedConnect::FailConnect(message) => return Err(anyhow!(message)),
            PlannedConnect::FailLists(message) => (FetchOutcome::default(), Some(message)),
        };
        Ok(Box::new(ScriptedHandle {
            outcome,
            lists_error,
            disposals: self.disposals.clone(),
        }))
    }
}

struct ScriptedHandle {
    outcome: FetchOutcome,
    lists_error: Option<String>,
    disposals: Arc<AtomicUsize>,
}

impl ScriptedHandle {
    fn check(&self) -> anyhow::Result<()> {
        match &self.lists_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionManagerHandle for ScriptedHandle {
    async fn running_kernels(&self) -> anyhow::Result<Vec<RunningKernelModel>> {
        self.check()?;
        Ok(self.outcome.kernels.clone())
    }

    async fn kernel_specs(&self) -> anyhow::Result<Vec<KernelSpecModel>> {
        self.check()?;
        Ok(self.outcome.specs.clone())
    }

    async fn running_sessions(&self) -> anyhow::Result<Vec<SessionModel>> {
        self.check()?;
        Ok(self.outcome.sessions.clone())
    }

    async fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Memory-backed store that counts traffic.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Direct peek at a persisted entry, bypassing the counters.
    pub async fn entry(&self, key: &str) -> Option<CachedCandidates> {
        self.inner.read(key).await.unwrap()
    }

    /// Direct preload, bypassing the counters.
    pub async fn preload(&self, key: &str, entry: &CachedCandidates) {
        self.inner.write(key, entry).await.unwrap();
    }
}

#[async_trait]
impl CandidateStore for RecordingStore {
    async fn read(&self, key: &str) -> anyhow::Result<Option<CachedCandidates>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, entry: &CachedCandidates) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(key, entry).await
    }
}

/// Registry fake that records registrations and affinity changes.
#[derive(Default)]
pub struct RecordingRegistry {
    registered: StdMutex<Vec<RegisteredCandidate>>,
    affinities: StdMutex<Vec<(DocumentId, ConnectionId, Affinity)>>,
    default_python: StdMutex<Option<RegisteredCandidate>>,
    explicit: StdMutex<HashMap<DocumentId, ConnectionId>>,
    default_python_calls: AtomicUsize,
}

impl RecordingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, connection: KernelConnection, kind: DocumentKind) {
        self.registered
            .lock()
            .unwrap()
            .push(RegisteredCandidate { connection, kind });
    }

    pub fn set_default_python(&self, connection: KernelConnection, kind: DocumentKind) {
        *self.default_python.lock().unwrap() = Some(RegisteredCandidate { connection, kind });
    }

    pub fn set_explicit(&self, document: &DocumentId, candidate: &ConnectionId) {
        self.explicit
            .lock()
            .unwrap()
            .insert(document.clone(), candidate.clone());
    }

    pub fn remove(&self, id: &ConnectionId) {
        self.registered
            .lock()
            .unwrap()
            .retain(|candidate| candidate.connection.id() != id);
    }

    pub fn affinities(&self) -> Vec<(DocumentId, ConnectionId, Affinity)> {
        self.affinities.lock().unwrap().clone()
    }

    pub fn registered_ids(&self) -> Vec<ConnectionId> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .map(|candidate| candidate.connection.id().clone())
            .collect()
    }

    pub fn default_python_calls(&self) -> usize {
        self.default_python_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateRegistry for RecordingRegistry {
    fn all(&self) -> Vec<RegisteredCandidate> {
        self.registered.lock().unwrap().clone()
    }

    fn get(&self, id: &ConnectionId, kind: DocumentKind) -> Option<RegisteredCandidate> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .find(|candidate| candidate.connection.id() == id && candidate.kind == kind)
            .cloned()
    }

    async fn register(
        &self,
        connection: KernelConnection,
        kind: DocumentKind,
    ) -> anyhow::Result<RegisteredCandidate> {
        let candidate = RegisteredCandidate { connection, kind };
        self.registered.lock().unwrap().push(candidate.clone());
        Ok(candidate)
    }

    async fn set_affinity(
        &self,
        document: &DocumentId,
        candidate: &ConnectionId,
        affinity: Affinity,
    ) {
        self.affinities
            .lock()
            .unwrap()
            .push((document.clone(), candidate.clone(), affinity));
    }

    async fn default_python_candidate(&self, kind: DocumentKind) -> Option<RegisteredCandidate> {
        self.default_python_calls.fetch_add(1, Ordering::SeqCst);
        self.default_python
            .lock()
            .unwrap()
            .clone()
            .filter(|candidate| candidate.kind == kind)
    }

    fn explicit_selection(&self, document: &DocumentId) -> Option<ConnectionId> {
        self.explicit.lock().unwrap().get(document).cloned()
    }
}

#[derive(Default)]
pub struct RecordingLedger {
    records: StdMutex<Vec<(DocumentId, ConnectionId)>>,
    failing: AtomicBool,
}

impl RecordingLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(DocumentId, ConnectionId)> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SelectionLedger for RecordingLedger {
    async fn record(&self, document: &DocumentId, candidate: &ConnectionId) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("scripted ledger failure"));
        }
        self.records
            .lock()
            .unwrap()
            .push((document.clone(), candidate.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    events: StdMutex<Vec<(MatchReason, PreferredOutcome)>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(MatchReason, PreferredOutcome)> {
        self.events.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn preferred_outcome(&self, reason: MatchReason, outcome: PreferredOutcome) {
        self.events.lock().unwrap().push((reason, outcome));
    }
}

pub struct TrustState {
    trusted: AtomicBool,
}

impl TrustState {
    pub fn trusted() -> Arc<Self> {
        Arc::new(Self {
            trusted: AtomicBool::new(true),
        })
    }

    pub fn untrusted() -> Arc<Self> {
        Arc::new(Self {
            trusted: AtomicBool::new(false),
        })
    }

    pub fn set(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::SeqCst);
    }
}

impl WorkspaceTrust for TrustState {
    fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }
}

/// Validator that accepts everything unless told otherwise.
#[derive(Default)]
pub struct ScriptedValidator {
    reject_all: AtomicBool,
    rejected: StdMutex<HashSet<String>>,
}

impl ScriptedValidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_all(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    pub fn reject(&self, connection_id: &str) {
        self.rejected
            .lock()
            .unwrap()
            .insert(connection_id.to_string());
    }
}

#[async_trait]
impl SessionValidator for ScriptedValidator {
    async fn is_valid(&self, candidate: &LiveSessionConnection) -> bool {
        if self.reject_all.load(Ordering::SeqCst) {
            return false;
        }
        !self
            .rejected
            .lock()
            .unwrap()
            .contains(candidate.id.as_str())
    }
}

/// Interpreter lookup backed by a path map; unmapped paths fail.
#[derive(Default)]
pub struct ScriptedInterpreters {
    by_path: StdMutex<HashMap<PathBuf, InterpreterInfo>>,
    calls: AtomicUsize,
}

impl ScriptedInterpreters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: impl Into<PathBuf>, info: InterpreterInfo) {
        self.by_path.lock().unwrap().insert(path.into(), info);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterpreterLookup for ScriptedInterpreters {
    async fn resolve(&self, path: &Path) -> anyhow::Result<InterpreterInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.by_path
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no interpreter at {}", path.display()))
    }
}

/// Local-discovery capability serving a fixed list.
pub struct FixedLocalDiscovery {
    connections: Vec<KernelConnection>,
}

impl FixedLocalDiscovery {
    pub fn new(connections: Vec<KernelConnection>) -> Arc<Self> {
        Arc::new(Self { connections })
    }
}

#[async_trait]
impl LocalDiscovery for FixedLocalDiscovery {
    async fn list(&self, _scope: &DocumentScope) -> anyhow::Result<Vec<KernelConnection>> {
        Ok(self.connections.clone())
    }
}

/// Discovery source with a hand-cranked readiness gate and candidate list.
pub struct ManualSource {
    id: SourceId,
    kind: SourceKind,
    ready_tx: watch::Sender<bool>,
    candidates: StdMutex<Vec<KernelConnection>>,
    changed_tx: broadcast::Sender<()>,
    list_calls: AtomicUsize,
    failing: AtomicBool,
}

impl ManualSource {
    /// Starts not ready; `list_all` callers block until `mark_ready`.
    pub fn new(id: &str, kind: SourceKind) -> Arc<Self> {
        let (ready_tx, _) = watch::channel(false);
        let (changed_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            id: SourceId::new(id),
            kind,
            ready_tx,
            candidates: StdMutex::new(Vec::new()),
            changed_tx,
            list_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn ready(id: &str, kind: SourceKind) -> Arc<Self> {
        let source = Self::new(id, kind);
        source.mark_ready();
        source
    }

    pub fn mark_ready(&self) {
        // `send` drops the value when no receiver exists yet; `send_replace`
        // latches it so later `wait_ready` subscribers observe readiness.
        self.ready_tx.send_replace(true);
    }

    pub fn set_candidates(&self, candidates: Vec<KernelConnection>) {
        *self.candidates.lock().unwrap() = candidates;
        let _ = self.changed_tx.send(());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoverySource for ManualSource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn display_name(&self) -> String {
        format!("{} kernels", self.id)
    }

    async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn list(&self, _scope: &DocumentScope) -> kernelscout_core::Result<Vec<KernelConnection>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScoutError::Unexpected(anyhow!("scripted listing failure")));
        }
        Ok(self.candidates.lock().unwrap().clone())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changed_tx.subscribe()
    }
}

/// All the wiring a remote-finder test needs, with a fast debounce window.
pub struct ServerFixture {
    pub server: ServerConnectionInfo,
    pub sessions: Arc<ScriptedSessionManager>,
    pub store: Arc<RecordingStore>,
    pub validator: Arc<ScriptedValidator>,
    pub exclusions: SessionExclusions,
    pub lifecycle: KernelLifecycleHub,
    pub config: RemoteFinderConfig,
}

impl ServerFixture {
    pub fn new() -> Self {
        Self {
            server: fixtures::server_info("http://localhost:8888/", "Test Jupyter"),
            sessions: ScriptedSessionManager::new(),
            store: RecordingStore::new(),
            validator: ScriptedValidator::new(),
            exclusions: SessionExclusions::new(),
            lifecycle: KernelLifecycleHub::new(),
            config: RemoteFinderConfig {
                disposal_debounce_ms: 25,
                ..Default::default()
            },
        }
    }

    pub fn shared(&self) -> RemoteFinderShared {
        self.shared_with_interpreters(None)
    }

    pub fn shared_with_interpreters(
        &self,
        interpreters: Option<Arc<ScriptedInterpreters>>,
    ) -> RemoteFinderShared {
        RemoteFinderShared {
            sessions: self.sessions.clone(),
            store: self.store.clone(),
            validator: self.validator.clone(),
            interpreters: interpreters.map(|lookup| lookup as Arc<dyn InterpreterLookup>),
            exclusions: self.exclusions.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }

    pub fn finder(&self) -> Arc<RemoteKernelFinder> {
        RemoteKernelFinder::new(self.server.clone(), self.config.clone(), self.shared())
    }

    pub fn cache_key(&self) -> String {
        self.config.cache_key(&self.server.server_id)
    }
}

impl Default for ServerFixture {
    fn default() -> Self {
        Self::new()
    }
}
