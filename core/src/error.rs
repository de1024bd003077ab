use kernelscout_protocol::ServerId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

/// Failure taxonomy for discovery and selection.
///
/// None of these escape to the host as panics or poisoned state: fetch and
/// store failures degrade to cached or empty results, and `Cancelled` marks
/// the normal abort path of superseded work.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("live kernel fetch from server {server} failed: {source}")]
    TransientFetch {
        server: ServerId,
        #[source]
        source: anyhow::Error,
    },
    #[error("candidate store operation failed: {source}")]
    Store {
        #[source]
        source: anyhow::Error,
    },
    #[error("interpreter resolution failed: {source}")]
    Resolution {
        #[source]
        source: anyhow::Error,
    },
    #[error("operation superseded or cancelled")]
    Cancelled,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ScoutError {
    pub(crate) fn transient_fetch(server: ServerId, source: anyhow::Error) -> Self {
        Self::TransientFetch { server, source }
    }

    pub(crate) fn store(source: anyhow::Error) -> Self {
        Self::Store { source }
    }

    pub(crate) fn resolution(source: anyhow::Error) -> Self {
        Self::Resolution { source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
