//! Manager configuration.

use bridge_core::crd::{DEFAULT_EXECUTOR_IMAGE, DEFAULT_INGRESS_IMAGE};
use std::env;
use std::time::Duration;

/// Configuration for the bridge manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Interval between provisioning sweeps.
    pub sweep_interval: Duration,
    /// Upper bound on every cluster call made by the sweep.
    pub call_timeout: Duration,
    /// Image of bridge ingress workloads.
    pub ingress_image: String,
    /// Image of processor executor workloads.
    pub executor_image: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
            ingress_image: DEFAULT_INGRESS_IMAGE.to_string(),
            executor_image: DEFAULT_EXECUTOR_IMAGE.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BRIDGE_SWEEP_INTERVAL_SECS`: sweep interval (default 5)
    /// - `BRIDGE_CALL_TIMEOUT_SECS`: per-call cluster timeout (default 10)
    /// - `BRIDGE_INGRESS_IMAGE`: ingress image
    /// - `BRIDGE_EXECUTOR_IMAGE`: executor image
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unparseable or zero durations fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let image = |key: &str, default: String| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
        };

        Self {
            sweep_interval: secs("BRIDGE_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            call_timeout: secs("BRIDGE_CALL_TIMEOUT_SECS", defaults.call_timeout),
            ingress_image: image("BRIDGE_INGRESS_IMAGE", defaults.ingress_image),
            executor_image: image("BRIDGE_EXECUTOR_IMAGE", defaults.executor_image),
        }
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the per-call cluster timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = ManagerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.ingress_image, DEFAULT_INGRESS_IMAGE);
    }

    #[test]
    fn reads_variables() {
        let config = ManagerConfig::from_lookup(lookup(&[
            ("BRIDGE_SWEEP_INTERVAL_SECS", "2"),
            ("BRIDGE_CALL_TIMEOUT_SECS", "3"),
            ("BRIDGE_EXECUTOR_IMAGE", "registry.local/executor:2"),
        ]));
        assert_eq!(config.sweep_interval, Duration::from_secs(2));
        assert_eq!(config.call_timeout, Duration::from_secs(3));
        assert_eq!(config.executor_image, "registry.local/executor:2");
    }

    #[test]
    fn bad_values_fall_back() {
        let config = ManagerConfig::from_lookup(lookup(&[
            ("BRIDGE_SWEEP_INTERVAL_SECS", "soon"),
            ("BRIDGE_CALL_TIMEOUT_SECS", "0"),
            ("BRIDGE_INGRESS_IMAGE", ""),
        ]));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.ingress_image, DEFAULT_INGRESS_IMAGE);
    }
}
