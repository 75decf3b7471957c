//! Reconciler configuration

use crate::RetryPolicy;

/// Defaults applied to synthesized endpoints and managed-object annotations
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// VPC assigned to scaled endpoints
    pub default_vpc: String,
    /// Network assigned to scaled endpoints
    pub default_net: String,
    /// VNI assigned to scaled endpoints
    pub default_vni: String,
    /// Annotation marking a built-in endpoints object as managed
    pub annotation_key: String,
    pub annotation_value: String,
    /// Retry policy for conditional writes
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_vpc: "vpc0".to_string(),
            default_net: "net0".to_string(),
            default_vni: "1".to_string(),
            annotation_key: "service.beta.kubernetes.io/netmesh-scaled-endpoint-type".to_string(),
            annotation_value: "scaled-endpoint".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}
