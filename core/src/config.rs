use std::time::Duration;

use kernelscout_protocol::ServerId;
use serde::Deserialize;
use serde::Serialize;

/// Tunables for one per-server remote finder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFinderConfig {
    /// Delay between a kernel disposal event and the refresh it triggers.
    /// Disposals inside the window restart the timer instead of stacking.
    #[serde(default = "default_disposal_debounce_ms")]
    pub disposal_debounce_ms: u64,

    /// Prefix of the per-server store key, `<prefix>-<server_id>`.
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,

    /// Version stamped into persisted cache entries. Entries written by a
    /// different version are discarded on read.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

fn default_disposal_debounce_ms() -> u64 {
    2000
}

fn default_cache_key_prefix() -> String {
    "kernelscout-remote".to_string()
}

fn default_schema_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for RemoteFinderConfig {
    fn default() -> Self {
        Self {
            disposal_debounce_ms: default_disposal_debounce_ms(),
            cache_key_prefix: default_cache_key_prefix(),
            schema_version: default_schema_version(),
        }
    }
}

impl RemoteFinderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_key_prefix.is_empty() {
            return Err("cache_key_prefix must not be empty".to_string());
        }
        if self.schema_version.is_empty() {
            return Err("schema_version must not be empty".to_string());
        }
        Ok(())
    }

    pub fn disposal_debounce(&self) -> Duration {
        Duration::from_millis(self.disposal_debounce_ms)
    }

    pub fn cache_key(&self, server: &ServerId) -> String {
        format!("{}-{server}", self.cache_key_prefix)
    }
}

/// Tunables for the preferred-selection coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Delay between a document opening and the preferred computation, so
    /// rapid open/close churn collapses into one run.
    #[serde(default = "default_open_debounce_ms")]
    pub open_debounce_ms: u64,

    /// Whether kernels may be launched on this machine. When set, Python
    /// documents short-circuit to the default local Python candidate.
    #[serde(default = "default_true")]
    pub local_launch: bool,

    /// Restricts ranking to candidates of one server when set.
    #[serde(default)]
    pub server_scope: Option<ServerId>,
}

fn default_open_debounce_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            open_debounce_ms: default_open_debounce_ms(),
            local_launch: true,
            server_scope: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn open_debounce(&self) -> Duration {
        Duration::from_millis(self.open_debounce_ms)
    }
}
