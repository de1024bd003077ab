use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::ids::ConnectionId;
use crate::ids::ServerId;
use crate::ids::SourceId;

/// Kernel spec as advertised by a local install or a remote server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelSpecModel {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Launch command, first element is the executable.
    #[serde(default)]
    pub argv: Vec<String>,
}

/// Interpreter backing a Python kernel. The `id` is a stable content hash so
/// it can be compared against hashes persisted in document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterInfo {
    pub id: String,
    pub path: std::path::PathBuf,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Runtime state of a kernel process as reported by the session manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningKernelModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connections: u32,
    #[serde(default)]
    pub execution_state: Option<String>,
}

/// Session record as reported by the session manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub kernel: Option<RunningKernelModel>,
}

/// Session merged with its matching spec and runtime kernel data.
///
/// Unmatched pieces stay at their empty defaults rather than failing the
/// merge; a session is still usable when the server no longer advertises the
/// spec it was started from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveSessionModel {
    pub session_id: String,
    pub session_name: String,
    #[serde(default)]
    pub session_path: Option<String>,
    #[serde(default)]
    pub kernel: RunningKernelModel,
    #[serde(default)]
    pub spec: KernelSpecModel,
}

/// Spec-based candidate launched on the local machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSpecConnection {
    pub id: ConnectionId,
    pub spec: KernelSpecModel,
    #[serde(default)]
    pub interpreter: Option<InterpreterInfo>,
}

/// Spec-based candidate that starts a fresh kernel on a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSpecConnection {
    pub id: ConnectionId,
    pub server_id: ServerId,
    pub base_url: Url,
    pub spec: KernelSpecModel,
    #[serde(default)]
    pub interpreter: Option<InterpreterInfo>,
}

/// Candidate that attaches to a kernel already running on a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSessionConnection {
    pub id: ConnectionId,
    pub server_id: ServerId,
    pub base_url: Url,
    pub session: LiveSessionModel,
}

/// A connection candidate produced by a discovery source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelConnection {
    LocalSpec(LocalSpecConnection),
    RemoteSpec(RemoteSpecConnection),
    LiveRemoteSession(LiveSessionConnection),
}

impl KernelConnection {
    pub fn id(&self) -> &ConnectionId {
        match self {
            Self::LocalSpec(c) => &c.id,
            Self::RemoteSpec(c) => &c.id,
            Self::LiveRemoteSession(c) => &c.id,
        }
    }

    /// Server id for remote variants, `None` for local specs.
    pub fn server_id(&self) -> Option<&ServerId> {
        match self {
            Self::LocalSpec(_) => None,
            Self::RemoteSpec(c) => Some(&c.server_id),
            Self::LiveRemoteSession(c) => Some(&c.server_id),
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        match self {
            Self::LocalSpec(_) => None,
            Self::RemoteSpec(c) => Some(&c.base_url),
            Self::LiveRemoteSession(c) => Some(&c.base_url),
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::LocalSpec(_))
    }

    pub fn is_live_session(&self) -> bool {
        matches!(self, Self::LiveRemoteSession(_))
    }

    /// Language declared by the candidate's spec, if any.
    pub fn language(&self) -> Option<&str> {
        match self {
            Self::LocalSpec(c) => c.spec.language.as_deref(),
            Self::RemoteSpec(c) => c.spec.language.as_deref(),
            Self::LiveRemoteSession(c) => c.session.spec.language.as_deref(),
        }
    }

    pub fn spec_name(&self) -> Option<&str> {
        let name = match self {
            Self::LocalSpec(c) => c.spec.name.as_str(),
            Self::RemoteSpec(c) => c.spec.name.as_str(),
            Self::LiveRemoteSession(c) => c.session.spec.name.as_str(),
        };
        if name.is_empty() { None } else { Some(name) }
    }

    pub fn interpreter(&self) -> Option<&InterpreterInfo> {
        match self {
            Self::LocalSpec(c) => c.interpreter.as_ref(),
            Self::RemoteSpec(c) => c.interpreter.as_ref(),
            Self::LiveRemoteSession(_) => None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::LocalSpec(c) => &c.spec.display_name,
            Self::RemoteSpec(c) => &c.spec.display_name,
            Self::LiveRemoteSession(c) => &c.session.session_name,
        }
    }
}

/// Identity of the discovery source a candidate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: SourceId,
    pub display_name: String,
}

/// Connection candidate stamped with its originating source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedCandidate {
    pub connection: KernelConnection,
    pub source: SourceInfo,
}
