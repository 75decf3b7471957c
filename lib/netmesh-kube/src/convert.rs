//! Conversions between Kubernetes objects and reconciler types

use k8s_openapi::api::core::v1::Endpoints;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use netmesh_api::v1alpha1::EndpointSpec;
use netmesh_api::EndpointStatus;
use netmesh_core::{BackendAddress, BackendGroup, Endpoint};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Backend groups of a built-in endpoints object, one per subset
pub fn backend_groups(endpoints: &Endpoints) -> Vec<BackendGroup> {
    endpoints
        .subsets
        .iter()
        .flatten()
        .map(|subset| BackendGroup {
            addresses: subset
                .addresses
                .iter()
                .flatten()
                .map(|addr| BackendAddress {
                    ip: Some(addr.ip.clone()).filter(|ip| !ip.is_empty()),
                })
                .collect(),
        })
        .collect()
}

/// Whether a built-in endpoints object carries the managed annotation
pub fn is_managed(endpoints: &Endpoints, key: &str, value: &str) -> bool {
    endpoints
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .is_some_and(|v| v == value)
}

/// Set `key=value` on an object's annotations. Returns false when the
/// annotation was already set and nothing changed.
pub fn set_annotation(metadata: &mut ObjectMeta, key: &str, value: &str) -> bool {
    let annotations = metadata.annotations.get_or_insert_with(Default::default);
    if annotations.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    annotations.insert(key.to_string(), value.to_string());
    true
}

/// Status merge patch moving an endpoint resource to `phase`
pub fn phase_patch(phase: EndpointStatus, at: &str) -> Value {
    json!({
        "status": {
            "phase": phase,
            "lastUpdateTime": at,
        }
    })
}

/// Status merge patch recording the bouncers serving an endpoint
pub fn bouncers_patch(endpoint: &Endpoint) -> Value {
    json!({
        "status": {
            "bouncers": endpoint.bouncers(),
        }
    })
}

/// Whether the bouncers recorded on a resource differ from `served`
pub fn bouncers_outdated(resource: &netmesh_api::Endpoint, served: &BTreeSet<String>) -> bool {
    let recorded = resource
        .status
        .as_ref()
        .map(|status| status.bouncers.as_slice())
        .unwrap_or_default();
    !recorded.iter().eq(served.iter())
}

/// Endpoint custom resource for a reconciler endpoint
pub fn to_resource(endpoint: &Endpoint) -> netmesh_api::Endpoint {
    netmesh_api::Endpoint::new(
        &endpoint.name,
        EndpointSpec {
            endpoint_type: endpoint.endpoint_type,
            vpc: endpoint.vpc.clone(),
            net: endpoint.net.clone(),
            vni: endpoint.vni.clone(),
            ip: endpoint.ip.clone(),
            mac: endpoint.mac.clone(),
            backends: endpoint.backends().iter().cloned().collect(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};
    use netmesh_api::v1alpha1::EndpointResourceStatus;
    use netmesh_api::EndpointType;
    use std::collections::BTreeMap;

    fn address(ip: &str) -> EndpointAddress {
        EndpointAddress {
            ip: ip.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_backend_groups_follow_subsets() {
        let endpoints = Endpoints {
            subsets: Some(vec![
                EndpointSubset {
                    addresses: Some(vec![address("10.1.1.1"), address("10.1.1.2")]),
                    ..Default::default()
                },
                EndpointSubset {
                    addresses: None,
                    ..Default::default()
                },
                EndpointSubset {
                    addresses: Some(vec![address("")]),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let groups = backend_groups(&endpoints);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], BackendGroup::new(["10.1.1.1", "10.1.1.2"]));
        assert!(groups[1].addresses.is_empty());
        assert_eq!(groups[2].addresses[0].ip, None);
    }

    #[test]
    fn test_backend_groups_without_subsets() {
        assert!(backend_groups(&Endpoints::default()).is_empty());
    }

    #[test]
    fn test_is_managed() {
        let mut annotations = BTreeMap::new();
        annotations.insert("netmesh/key".to_string(), "yes".to_string());
        let endpoints = Endpoints {
            metadata: ObjectMeta {
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(is_managed(&endpoints, "netmesh/key", "yes"));
        assert!(!is_managed(&endpoints, "netmesh/key", "no"));
        assert!(!is_managed(&Endpoints::default(), "netmesh/key", "yes"));
    }

    #[test]
    fn test_to_resource() {
        let mut endpoint = Endpoint::new("web", "net0").with_backends(["10.1.1.1"]);
        endpoint.endpoint_type = EndpointType::Scaled;
        endpoint.ip = "10.96.0.20".to_string();

        let resource = to_resource(&endpoint);
        assert_eq!(resource.metadata.name.as_deref(), Some("web"));
        assert_eq!(resource.spec.net, "net0");
        assert_eq!(resource.spec.endpoint_type, EndpointType::Scaled);
        assert_eq!(resource.spec.backends, vec!["10.1.1.1".to_string()]);
        assert!(resource.status.is_none());
    }

    #[test]
    fn test_set_annotation() {
        let mut metadata = ObjectMeta::default();
        assert!(set_annotation(&mut metadata, "netmesh/key", "yes"));
        assert!(!set_annotation(&mut metadata, "netmesh/key", "yes"));
        assert!(set_annotation(&mut metadata, "netmesh/key", "no"));

        let annotations = metadata.annotations.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations["netmesh/key"], "no");
    }

    #[test]
    fn test_phase_patch_leaves_bouncers_alone() {
        let patch = phase_patch(EndpointStatus::Provisioned, "2026-01-01T00:00:00Z");
        let status = &patch["status"];
        assert_eq!(status["phase"], "Provisioned");
        assert_eq!(status["lastUpdateTime"], "2026-01-01T00:00:00Z");
        assert!(status.get("bouncers").is_none());
    }

    #[test]
    fn test_bouncers_patch() {
        let ep = Endpoint::new("svc-x", "net-A");
        assert_eq!(bouncers_patch(&ep), json!({ "status": { "bouncers": [] } }));
    }

    #[test]
    fn test_bouncers_outdated() {
        let mut resource = netmesh_api::Endpoint::new("svc-x", EndpointSpec::default());
        let mut served = BTreeSet::new();
        assert!(!bouncers_outdated(&resource, &served));

        served.insert("lb1".to_string());
        assert!(bouncers_outdated(&resource, &served));

        resource.status = Some(EndpointResourceStatus {
            bouncers: vec!["lb1".to_string()],
            ..Default::default()
        });
        assert!(!bouncers_outdated(&resource, &served));

        served.insert("lb2".to_string());
        assert!(bouncers_outdated(&resource, &served));
    }
}
