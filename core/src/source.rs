use async_trait::async_trait;
use kernelscout_protocol::DocumentScope;
use kernelscout_protocol::KernelConnection;
use kernelscout_protocol::SourceId;
use kernelscout_protocol::SourceInfo;
use tokio::sync::broadcast;

use crate::error::Result;

/// Coarse origin of a discovery source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Local,
    Remote,
}

/// One provider of kernel connection candidates.
///
/// Sources stay registered with the aggregator for its whole life; a
/// disposed source must keep reporting ready and list nothing.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn id(&self) -> SourceId;

    fn kind(&self) -> SourceKind;

    fn display_name(&self) -> String;

    /// Resolves once `list` can answer. For a caching source this is after
    /// the first load attempt settles, successful or not.
    async fn wait_ready(&self);

    async fn list(&self, scope: &DocumentScope) -> Result<Vec<KernelConnection>>;

    /// No-payload notification that `list` would now return something else.
    fn subscribe_changes(&self) -> broadcast::Receiver<()>;

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            id: self.id(),
            display_name: self.display_name(),
        }
    }
}
