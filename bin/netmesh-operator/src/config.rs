//! Operator configuration from environment variables

use anyhow::{Context, Result};
use netmesh_core::ReconcilerConfig;
use std::time::Duration;

/// Runtime configuration of the operator
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace watched for endpoints, bouncers and services
    pub namespace: String,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
    pub reconciler: ReconcilerConfig,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reconciler = ReconcilerConfig::default();
        if let Some(vpc) = lookup("NETMESH_DEFAULT_VPC") {
            reconciler.default_vpc = vpc;
        }
        if let Some(net) = lookup("NETMESH_DEFAULT_NET") {
            reconciler.default_net = net;
        }
        if let Some(vni) = lookup("NETMESH_DEFAULT_VNI") {
            reconciler.default_vni = vni;
        }
        if let Some(attempts) = lookup("NETMESH_ANNOTATE_MAX_ATTEMPTS") {
            reconciler.retry.max_attempts = attempts
                .parse()
                .with_context(|| format!("invalid NETMESH_ANNOTATE_MAX_ATTEMPTS: {}", attempts))?;
        }
        if let Some(ms) = lookup("NETMESH_ANNOTATE_BACKOFF_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("invalid NETMESH_ANNOTATE_BACKOFF_MS: {}", ms))?;
            reconciler.retry.initial_backoff = Duration::from_millis(ms);
        }

        Ok(Self {
            namespace: lookup("NETMESH_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            json_logs: lookup("NETMESH_LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            reconciler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.namespace, "default");
        assert!(!config.json_logs);
        assert_eq!(config.reconciler.default_net, "net0");
        assert_eq!(config.reconciler.retry.max_attempts, 5);
    }

    #[test]
    fn test_overrides() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            ("NETMESH_NAMESPACE", "mesh"),
            ("NETMESH_LOG_FORMAT", "JSON"),
            ("NETMESH_DEFAULT_NET", "net7"),
            ("NETMESH_ANNOTATE_MAX_ATTEMPTS", "9"),
            ("NETMESH_ANNOTATE_BACKOFF_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, "mesh");
        assert!(config.json_logs);
        assert_eq!(config.reconciler.default_net, "net7");
        assert_eq!(config.reconciler.retry.max_attempts, 9);
        assert_eq!(
            config.reconciler.retry.initial_backoff,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result =
            OperatorConfig::from_lookup(lookup_from(&[("NETMESH_ANNOTATE_MAX_ATTEMPTS", "many")]));
        assert!(result.is_err());
    }
}
