//! Naming conventions for tenant namespaces, desired resources and labels.
//!
//! Kubernetes object names are DNS-1123 labels: lowercase alphanumerics and
//! `-`, at most 63 characters, starting and ending with an alphanumeric.

/// Maximum length of a DNS-1123 label.
pub const MAX_NAME_LEN: usize = 63;

/// Prefix applied to every generated name.
pub const NAME_PREFIX: &str = "ob-";

/// Selector label; the only label Deployment selectors match on.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Component label (`ingress` or `executor`).
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Managed-by label.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every object the operator creates.
pub const MANAGED_BY: &str = "bridge-operator";

/// Sanitize an arbitrary identifier into a DNS-1123 label.
///
/// Uppercase letters are lowered, every other disallowed character becomes
/// `-`, the result is truncated and stripped of leading and trailing `-`.
pub fn sanitize_name(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '-',
        })
        .collect();
    let truncated: String = mapped.chars().take(MAX_NAME_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// Namespace holding every workload of a customer.
pub fn customer_namespace(customer_id: &str) -> String {
    sanitize_name(&format!("{}{}", NAME_PREFIX, customer_id))
}

/// Name of the `BridgeIngress` for a bridge.
pub fn ingress_name(bridge_id: &str) -> String {
    sanitize_name(&format!("{}{}", NAME_PREFIX, bridge_id))
}

/// Name of the `BridgeExecutor` for a processor.
pub fn executor_name(processor_id: &str) -> String {
    sanitize_name(&format!("{}{}", NAME_PREFIX, processor_id))
}
