use std::collections::HashMap;
use std::sync::Arc;

use kernelscout_protocol::Affinity;
use kernelscout_protocol::ConnectionId;
use kernelscout_protocol::DeclaredMetadata;
use kernelscout_protocol::DocumentId;
use kernelscout_protocol::DocumentKind;
use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::InterpreterInfo;
use kernelscout_protocol::MatchReason;
use kernelscout_protocol::PreferredOutcome;
use kernelscout_protocol::SourcedCandidate;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::capabilities::CandidateRegistry;
use crate::capabilities::InterpreterLookup;
use crate::capabilities::RegisteredCandidate;
use crate::capabilities::SelectionLedger;
use crate::capabilities::TelemetrySink;
use crate::capabilities::WorkspaceTrust;
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::error::ScoutError;
use crate::finder::KernelFinder;
use crate::ranking::KernelRanker;

/// Host collaborators the coordinator drives its side effects through.
#[derive(Clone)]
pub struct CoordinatorServices {
    pub registry: Arc<dyn CandidateRegistry>,
    pub ledger: Arc<dyn SelectionLedger>,
    pub trust: Arc<dyn WorkspaceTrust>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub interpreters: Option<Arc<dyn InterpreterLookup>>,
}

#[derive(Default)]
struct DocumentEntry {
    chosen: Option<ConnectionId>,
    inflight: Option<CancellationToken>,
    debounce: Option<JoinHandle<()>>,
}

/// Picks the preferred kernel candidate per document.
///
/// Computations are serialized per document by cancel-and-replace: a new
/// run stores its token and then cancels the predecessor, so at most one
/// run's side effects land and it is always the most recently started one.
/// Entries are keyed by document id and removed explicitly on close.
pub struct PreferredKernelCoordinator {
    config: CoordinatorConfig,
    finder: Arc<KernelFinder>,
    ranker: KernelRanker,
    services: CoordinatorServices,
    documents: Mutex<HashMap<DocumentId, DocumentEntry>>,
}

impl PreferredKernelCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        finder: Arc<KernelFinder>,
        ranker: KernelRanker,
        services: CoordinatorServices,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            finder,
            ranker,
            services,
            documents: Mutex::new(HashMap::new()),
        })
    }

    /// Debounced trigger for document-open events. Rapid re-opens of the
    /// same document abort and replace the pending timer, collapsing into
    /// one computation.
    pub async fn document_opened(self: &Arc<Self>, scope: DocumentScope, metadata: DeclaredMetadata) {
        let mut documents = self.documents.lock().await;
        let entry = documents.entry(scope.document.clone()).or_default();
        if let Some(timer) = entry.debounce.take() {
            timer.abort();
        }
        let weak = Arc::downgrade(self);
        let delay = self.config.open_debounce();
        entry.debounce = Some(tokio::spawn(async move {
            sleep(delay).await;
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            coordinator.compute_preferred(scope, metadata).await;
        }));
    }

    /// Immediate computation. Unexpected failures are logged and degrade to
    /// "no preferred candidate"; they never poison later opens.
    pub async fn compute_preferred(
        &self,
        scope: DocumentScope,
        metadata: DeclaredMetadata,
    ) -> Option<RegisteredCandidate> {
        match self.try_compute(&scope, &metadata).await {
            Ok(candidate) => candidate,
            Err(err) if err.is_cancelled() => {
                debug!("preferred kernel computation for {} superseded", scope.document);
                None
            }
            Err(err) => {
                warn!(
                    "preferred kernel computation for {} failed: {err:#}",
                    scope.document
                );
                None
            }
        }
    }

    /// Drops the document's entry. The pending timer is aborted before the
    /// in-flight token is cancelled.
    pub async fn document_closed(&self, document: &DocumentId) {
        let entry = self.documents.lock().await.remove(document);
        if let Some(mut entry) = entry {
            if let Some(timer) = entry.debounce.take() {
                timer.abort();
            }
            if let Some(token) = entry.inflight.take() {
                token.cancel();
            }
        }
    }

    /// Candidate currently chosen for a document, if a computation landed.
    pub async fn chosen(&self, document: &DocumentId) -> Option<ConnectionId> {
        self.documents
            .lock()
            .await
            .get(document)
            .and_then(|entry| entry.chosen.clone())
    }

    async fn try_compute(
        &self,
        scope: &DocumentScope,
        metadata: &DeclaredMetadata,
    ) -> Result<Option<RegisteredCandidate>> {
        if !self.services.trust.is_trusted() {
            debug!("workspace is untrusted, not selecting a kernel for {}", scope.document);
            return Ok(None);
        }
        if self.services.registry.explicit_selection(&scope.document).is_some() {
            debug!("{} already has an explicit kernel selection", scope.document);
            return Ok(None);
        }

        // The new token is recorded before the predecessor is cancelled, so
        // a late callback of the old run can never observe an empty slot.
        let token = CancellationToken::new();
        let previous = {
            let mut documents = self.documents.lock().await;
            let entry = documents.entry(scope.document.clone()).or_default();
            entry.inflight.replace(token.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        // Python documents (and interactive windows) in a local-launch
        // environment take the default local candidate without ranking.
        if self.config.local_launch
            && (metadata.is_python_like() || scope.kind == DocumentKind::Interactive)
        {
            let default = self
                .services
                .registry
                .default_python_candidate(scope.kind)
                .await;
            if let Some(candidate) = default {
                self.apply_selection(scope, &candidate, MatchReason::default(), &token)
                    .await?;
                return Ok(Some(candidate));
            }
        }
        if token.is_cancelled() {
            return Err(ScoutError::Cancelled);
        }

        let hint = self.resolve_interpreter_hint(scope, metadata).await;
        if token.is_cancelled() {
            return Err(ScoutError::Cancelled);
        }

        let first = self.rank_once(scope, metadata, hint.as_ref(), &token).await?;
        let ranked = match first {
            Some(found) => Some(found),
            // A discovery cache may have warmed since the first pass; one
            // more aggregation before giving up.
            None => self.rank_once(scope, metadata, hint.as_ref(), &token).await?,
        };
        let Some((top, reason)) = ranked else {
            debug!("no preferred kernel for {}", scope.document);
            return Ok(None);
        };

        let preferred_id = top.connection.id().clone();
        if self.services.registry.get(&preferred_id, scope.kind).is_none() {
            // Ranking can surface a kernel discovery has not registered yet.
            self.services
                .registry
                .register(top.connection.clone(), scope.kind)
                .await?;
            if token.is_cancelled() {
                return Err(ScoutError::Cancelled);
            }
        }
        // Resolved against the live registry, not the ranking-time snapshot.
        let Some(candidate) = self.services.registry.get(&preferred_id, scope.kind) else {
            debug!(
                "preferred kernel {preferred_id} is no longer registered for {}",
                scope.document
            );
            return Ok(None);
        };
        self.apply_selection(scope, &candidate, reason, &token).await?;
        Ok(Some(candidate))
    }

    /// One aggregation-plus-ranking pass. Reports the no-match decision to
    /// telemetry itself; a found decision is reported later, with the side
    /// effects it gates.
    async fn rank_once(
        &self,
        scope: &DocumentScope,
        metadata: &DeclaredMetadata,
        hint: Option<&InterpreterInfo>,
        token: &CancellationToken,
    ) -> Result<Option<(SourcedCandidate, MatchReason)>> {
        let pool = self.finder.list_all(scope, token).await;
        if token.is_cancelled() {
            return Err(ScoutError::Cancelled);
        }
        let ranked = self.ranker.rank(
            scope,
            &pool,
            metadata,
            hint,
            token,
            self.config.server_scope.as_ref(),
        );
        let reason = self.ranker.match_reason(&ranked, metadata, hint);
        if !reason.any() {
            self.services
                .telemetry
                .preferred_outcome(reason, PreferredOutcome::NotFound);
            return Ok(None);
        }
        Ok(ranked.last().cloned().map(|top| (top, reason)))
    }

    /// Hint for ranking: the interpreter the host associates with the
    /// document's path. Lookup failures leave the hint absent.
    async fn resolve_interpreter_hint(
        &self,
        scope: &DocumentScope,
        metadata: &DeclaredMetadata,
    ) -> Option<InterpreterInfo> {
        if self.config.server_scope.is_some() || !metadata.is_python_like() {
            return None;
        }
        let lookup = self.services.interpreters.as_ref()?;
        let path = scope.path.as_deref()?;
        match lookup.resolve(path).await {
            Ok(info) => Some(info),
            Err(err) => {
                let err = ScoutError::resolution(err);
                debug!("interpreter hint for {} unavailable: {err}", scope.document);
                None
            }
        }
    }

    /// The side-effect bundle of a landed computation. Gated on the token
    /// and on the document entry still being present; neither a cancelled
    /// run nor a closed document receives side effects.
    async fn apply_selection(
        &self,
        scope: &DocumentScope,
        candidate: &RegisteredCandidate,
        reason: MatchReason,
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(ScoutError::Cancelled);
        }
        let candidate_id = candidate.connection.id().clone();
        let previous = {
            let mut documents = self.documents.lock().await;
            // A close can land between the token check above and this
            // lock. The entry is gone then; never re-create one for a
            // document the host no longer tracks.
            let Some(entry) = documents.get_mut(&scope.document) else {
                return Err(ScoutError::Cancelled);
            };
            entry.chosen.replace(candidate_id.clone())
        };
        if let Some(previous) = previous
            && previous != candidate_id
        {
            self.services
                .registry
                .set_affinity(&scope.document, &previous, Affinity::Default)
                .await;
        }
        self.services
            .registry
            .set_affinity(&scope.document, &candidate_id, Affinity::Preferred)
            .await;
        self.services
            .telemetry
            .preferred_outcome(reason, PreferredOutcome::Found);
        if let Err(err) = self.services.ledger.record(&scope.document, &candidate_id).await {
            warn!(
                "recording the kernel choice for {} failed: {err:#}",
                scope.document
            );
        }
        Ok(())
    }
}
