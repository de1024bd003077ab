//! Shared data model for kernel-connection discovery and selection.
//!
//! This crate defines the connection candidates produced by discovery
//! sources, the document scopes they are ranked against, and the small
//! telemetry model used when a preferred candidate is chosen. It carries no
//! behavior beyond constructors and accessors so that hosts, finders, and
//! storage layers can share one serialization format.

mod connection;
mod document;
mod ids;
mod telemetry;

pub use connection::InterpreterInfo;
pub use connection::KernelConnection;
pub use connection::KernelSpecModel;
pub use connection::LiveSessionConnection;
pub use connection::LiveSessionModel;
pub use connection::LocalSpecConnection;
pub use connection::RemoteSpecConnection;
pub use connection::RunningKernelModel;
pub use connection::SessionModel;
pub use connection::SourceInfo;
pub use connection::SourcedCandidate;
pub use document::Affinity;
pub use document::DeclaredMetadata;
pub use document::DocumentKind;
pub use document::DocumentScope;
pub use ids::ConnectionId;
pub use ids::DocumentId;
pub use ids::ServerId;
pub use ids::SourceId;
pub use telemetry::MatchReason;
pub use telemetry::PreferredOutcome;

/// Language name used for Python-specific ranking and interpreter rules.
pub const PYTHON_LANGUAGE: &str = "python";
