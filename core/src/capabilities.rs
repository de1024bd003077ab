//! Host-provided collaborators, kept behind trait objects so the crate
//! stays independent of any wire protocol, storage engine, or editor model.

use std::path::Path;

use async_trait::async_trait;
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
use kernelscout_protocol::ServerId;
use kernelscout_protocol::SessionModel;
use url::Host;
use url::Url;

/// Connection details for one remote kernel server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConnectionInfo {
    pub server_id: ServerId,
    pub base_url: Url,
    pub display_name: String,
}

impl ServerConnectionInfo {
    pub fn new(base_url: Url, display_name: impl Into<String>) -> Self {
        Self {
            server_id: ServerId::from_url(&base_url),
            base_url,
            display_name: display_name.into(),
        }
    }

    /// True when the server runs on this machine. Interpreter paths in its
    /// kernel specs are only meaningful in that case.
    pub fn is_local_host(&self) -> bool {
        match self.base_url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        }
    }
}

/// Opens session-manager connections against a server.
#[async_trait]
pub trait SessionManagerProvider: Send + Sync {
    async fn connect(
        &self,
        server: &ServerConnectionInfo,
    ) -> anyhow::Result<Box<dyn SessionManagerHandle>>;
}

/// One live connection to a server's session manager.
#[async_trait]
pub trait SessionManagerHandle: Send + Sync {
    async fn running_kernels(&self) -> anyhow::Result<Vec<RunningKernelModel>>;
    async fn kernel_specs(&self) -> anyhow::Result<Vec<KernelSpecModel>>;
    async fn running_sessions(&self) -> anyhow::Result<Vec<SessionModel>>;
    /// Releases the connection. Callers invoke this on every path, including
    /// after a failed request.
    async fn dispose(&self);
}

/// Decides whether a cached live-session candidate still exists server-side.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn is_valid(&self, candidate: &LiveSessionConnection) -> bool;
}

/// Resolves an executable or document path to interpreter details.
#[async_trait]
pub trait InterpreterLookup: Send + Sync {
    async fn resolve(&self, path: &Path) -> anyhow::Result<InterpreterInfo>;
}

/// Enumerates kernels installed on this machine. Absent in environments
/// that cannot launch processes.
#[async_trait]
pub trait LocalDiscovery: Send + Sync {
    async fn list(&self, scope: &DocumentScope) -> anyhow::Result<Vec<KernelConnection>>;
}

/// A connection the host has registered for use by documents of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredCandidate {
    pub connection: KernelConnection,
    pub kind: DocumentKind,
}

/// The host editor's registry of usable candidates.
#[async_trait]
pub trait CandidateRegistry: Send + Sync {
    fn all(&self) -> Vec<RegisteredCandidate>;
    fn get(&self, id: &ConnectionId, kind: DocumentKind) -> Option<RegisteredCandidate>;
    async fn register(
        &self,
        connection: KernelConnection,
        kind: DocumentKind,
    ) -> anyhow::Result<RegisteredCandidate>;
    /// Adjusts how strongly a candidate is suggested for a document.
    async fn set_affinity(&self, document: &DocumentId, candidate: &ConnectionId, affinity: Affinity);
    /// Candidate for the workspace's default Python environment, when the
    /// host can produce one.
    async fn default_python_candidate(&self, kind: DocumentKind) -> Option<RegisteredCandidate>;
    /// The user's explicit kernel choice for a document, when recorded.
    fn explicit_selection(&self, document: &DocumentId) -> Option<ConnectionId>;
}

/// Persists the document-to-candidate mapping across sessions.
#[async_trait]
pub trait SelectionLedger: Send + Sync {
    async fn record(&self, document: &DocumentId, candidate: &ConnectionId) -> anyhow::Result<()>;
}

pub trait WorkspaceTrust: Send + Sync {
    fn is_trusted(&self) -> bool;
}

/// Trust capability for hosts without a trust model.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrusted;

impl WorkspaceTrust for AlwaysTrusted {
    fn is_trusted(&self) -> bool {
        true
    }
}

/// Receives one event per preferred-candidate decision.
pub trait TelemetrySink: Send + Sync {
    fn preferred_outcome(&self, reason: MatchReason, outcome: PreferredOutcome);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn preferred_outcome(&self, _reason: MatchReason, _outcome: PreferredOutcome) {}
}
