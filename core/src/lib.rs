//! Discovery, caching, ranking, and selection of compute-kernel connection
//! candidates for documents that need an execution backend.
//!
//! The crate is host-agnostic. Everything the host owns (the document
//! model, the remote wire protocol, persistent storage, interpreter
//! discovery, trust, telemetry) enters through the trait objects in
//! [`capabilities`]; the host embeds the building blocks here and wires
//! them together: a [`finder::KernelFinder`] aggregating discovery
//! sources, per-server [`remote::RemoteKernelFinder`]s feeding it, and a
//! [`preferred::PreferredKernelCoordinator`] picking a candidate per
//! document.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod finder;
pub mod lifecycle;
pub mod preferred;
pub mod ranking;
pub mod remote;
pub mod source;
pub mod sources;
pub mod store;

pub use capabilities::ServerConnectionInfo;
pub use config::CoordinatorConfig;
pub use config::RemoteFinderConfig;
pub use error::Result;
pub use error::ScoutError;
pub use finder::KernelFinder;
pub use lifecycle::KernelLifecycleEvent;
pub use lifecycle::KernelLifecycleHub;
pub use preferred::CoordinatorServices;
pub use preferred::PreferredKernelCoordinator;
pub use ranking::DefaultMatchPolicy;
pub use ranking::KernelRanker;
pub use ranking::MatchPolicy;
pub use remote::FinderStatus;
pub use remote::RemoteFinderController;
pub use remote::RemoteFinderShared;
pub use remote::RemoteKernelFinder;
pub use remote::SessionExclusions;
pub use source::DiscoverySource;
pub use source::SourceKind;
pub use sources::KernelSourceEntry;
pub use sources::KernelSourceRegistry;
pub use store::CachedCandidates;
pub use store::CandidateStore;
pub use store::JsonFileStore;
pub use store::MemoryStore;
