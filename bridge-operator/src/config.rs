//! Operator configuration.

use bridge_core::cluster::DEFAULT_FIELD_MANAGER;
use std::env;
use std::time::Duration;

/// Configuration for the operator.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// How long a workload may stay unavailable before it is declared failed.
    pub provisioning_deadline: Duration,
    /// Interval at which every desired resource is reconciled again.
    pub resync_interval: Duration,
    /// Restrict watches to one namespace; all namespaces when `None`.
    pub watch_namespace: Option<String>,
    /// Field manager recorded on cluster writes.
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            provisioning_deadline: Duration::from_secs(300),
            resync_interval: Duration::from_secs(60),
            watch_namespace: None,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BRIDGE_PROVISIONING_DEADLINE_SECS`: provisioning deadline (default 300)
    /// - `BRIDGE_RESYNC_INTERVAL_SECS`: resync interval (default 60)
    /// - `BRIDGE_OPERATOR_NAMESPACE`: namespace to watch (default all)
    /// - `BRIDGE_FIELD_MANAGER`: field manager name
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Zero or unparseable durations fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            provisioning_deadline: secs(
                "BRIDGE_PROVISIONING_DEADLINE_SECS",
                defaults.provisioning_deadline,
            ),
            resync_interval: secs("BRIDGE_RESYNC_INTERVAL_SECS", defaults.resync_interval),
            watch_namespace: lookup("BRIDGE_OPERATOR_NAMESPACE").filter(|ns| !ns.is_empty()),
            field_manager: lookup("BRIDGE_FIELD_MANAGER").unwrap_or(defaults.field_manager),
        }
    }

    /// Set the provisioning deadline.
    pub fn with_provisioning_deadline(mut self, deadline: Duration) -> Self {
        self.provisioning_deadline = deadline;
        self
    }

    /// Set the resync interval.
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }
}
