use std::path::Path;
use std::sync::Arc;

use kernelscout_protocol::DeclaredMetadata;
use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::InterpreterInfo;
use kernelscout_protocol::KernelConnection;
use kernelscout_protocol::MatchReason;
use kernelscout_protocol::PYTHON_LANGUAGE;
use kernelscout_protocol::ServerId;
use kernelscout_protocol::SourcedCandidate;
use tokio_util::sync::CancellationToken;

// Relative strength of the ranking signals. Exact identity outranks an
// attached session, which outranks interpreter, spec-name, and language
// agreement.
const EXACT_MATCH_WEIGHT: i32 = 100;
const SESSION_PATH_WEIGHT: i32 = 80;
const INTERPRETER_WEIGHT: i32 = 60;
const SPEC_NAME_WEIGHT: i32 = 40;
const LANGUAGE_WEIGHT: i32 = 20;

/// Pluggable definition of "exactly the kernel this document asks for".
pub trait MatchPolicy: Send + Sync {
    fn is_exact_match(&self, candidate: &KernelConnection, metadata: &DeclaredMetadata) -> bool;
}

/// Identity by declared spec name or by interpreter content hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatchPolicy;

impl MatchPolicy for DefaultMatchPolicy {
    fn is_exact_match(&self, candidate: &KernelConnection, metadata: &DeclaredMetadata) -> bool {
        if let (Some(declared), Some(name)) =
            (metadata.kernel_spec_name.as_deref(), candidate.spec_name())
            && declared == name
        {
            return true;
        }
        if let (Some(hash), Some(interpreter)) =
            (metadata.interpreter_hash.as_deref(), candidate.interpreter())
            && hash == interpreter.id
        {
            return true;
        }
        false
    }
}

/// Orders a candidate pool for a document, worst match first.
///
/// Callers index from the end: the best match is the last element. The
/// ordering is deterministic for a fixed input pool; equal scores keep
/// their pool order.
pub struct KernelRanker {
    policy: Arc<dyn MatchPolicy>,
}

impl KernelRanker {
    pub fn new() -> Self {
        Self::with_policy(Arc::new(DefaultMatchPolicy))
    }

    pub fn with_policy(policy: Arc<dyn MatchPolicy>) -> Self {
        Self { policy }
    }

    pub fn rank(
        &self,
        scope: &DocumentScope,
        pool: &[SourcedCandidate],
        metadata: &DeclaredMetadata,
        preferred_interpreter: Option<&InterpreterInfo>,
        token: &CancellationToken,
        server_scope: Option<&ServerId>,
    ) -> Vec<SourcedCandidate> {
        if token.is_cancelled() {
            return Vec::new();
        }
        let mut scored: Vec<(i32, SourcedCandidate)> = pool
            .iter()
            .filter(|candidate| match server_scope {
                Some(server) => candidate.connection.server_id() == Some(server),
                None => true,
            })
            .map(|candidate| {
                let score = self.score(scope, &candidate.connection, metadata, preferred_interpreter);
                (score, candidate.clone())
            })
            .collect();
        scored.sort_by_key(|(score, _)| *score);
        scored.into_iter().map(|(_, candidate)| candidate).collect()
    }

    pub fn is_exact_match(&self, candidate: &KernelConnection, metadata: &DeclaredMetadata) -> bool {
        self.policy.is_exact_match(candidate, metadata)
    }

    /// Which preferred-match conditions hold for the top-ranked candidate.
    ///
    /// A Python document needs identity-level evidence; for any other
    /// declared language, agreement on the language itself is enough.
    pub fn match_reason(
        &self,
        ranked: &[SourcedCandidate],
        metadata: &DeclaredMetadata,
        preferred_interpreter: Option<&InterpreterInfo>,
    ) -> MatchReason {
        let Some(top) = ranked.last() else {
            return MatchReason::default();
        };
        MatchReason {
            only_connection: ranked.len() == 1,
            preferred_interpreter: interpreter_matches(&top.connection, preferred_interpreter),
            exact_match: self.policy.is_exact_match(&top.connection, metadata),
            non_python_language_match: non_python_language_match(&top.connection, metadata),
        }
    }

    fn score(
        &self,
        scope: &DocumentScope,
        candidate: &KernelConnection,
        metadata: &DeclaredMetadata,
        preferred_interpreter: Option<&InterpreterInfo>,
    ) -> i32 {
        let mut score = 0;
        if self.policy.is_exact_match(candidate, metadata) {
            score += EXACT_MATCH_WEIGHT;
        }
        if session_belongs_to_document(candidate, scope) {
            score += SESSION_PATH_WEIGHT;
        }
        if interpreter_matches(candidate, preferred_interpreter) {
            score += INTERPRETER_WEIGHT;
        }
        if let (Some(declared), Some(name)) =
            (metadata.kernel_spec_name.as_deref(), candidate.spec_name())
            && declared == name
        {
            score += SPEC_NAME_WEIGHT;
        }
        if let (Some(declared), Some(language)) =
            (metadata.language.as_deref(), candidate.language())
            && declared.eq_ignore_ascii_case(language)
        {
            score += LANGUAGE_WEIGHT;
        }
        score
    }
}

impl Default for KernelRanker {
    fn default() -> Self {
        Self::new()
    }
}

fn interpreter_matches(candidate: &KernelConnection, hint: Option<&InterpreterInfo>) -> bool {
    match (candidate.interpreter(), hint) {
        (Some(interpreter), Some(hint)) => {
            interpreter.id == hint.id || interpreter.path == hint.path
        }
        _ => false,
    }
}

fn session_belongs_to_document(candidate: &KernelConnection, scope: &DocumentScope) -> bool {
    let KernelConnection::LiveRemoteSession(live) = candidate else {
        return false;
    };
    match (live.session.session_path.as_deref(), scope.path.as_deref()) {
        (Some(session_path), Some(document_path)) => Path::new(session_path) == document_path,
        _ => false,
    }
}

fn non_python_language_match(candidate: &KernelConnection, metadata: &DeclaredMetadata) -> bool {
    let Some(declared) = metadata.language.as_deref() else {
        return false;
    };
    if declared.eq_ignore_ascii_case(PYTHON_LANGUAGE) {
        return false;
    }
    candidate
        .language()
        .is_some_and(|language| language.eq_ignore_ascii_case(declared))
}
