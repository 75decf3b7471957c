//! Endpoint entity and its lifecycle state machine

use crate::{Bouncer, CoreError, Result};
use netmesh_api::{EndpointStatus, EndpointType};
use rand::Rng;
use std::collections::BTreeSet;

/// An endpoint as tracked by the reconciler.
///
/// `bouncers` holds the names of the bouncers currently serving the
/// endpoint's network; it is only ever written through the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub vpc: String,
    pub net: String,
    pub vni: String,
    pub ip: String,
    pub mac: String,
    pub endpoint_type: EndpointType,
    status: EndpointStatus,
    backends: BTreeSet<String>,
    bouncers: BTreeSet<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, net: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vpc: String::new(),
            net: net.into(),
            vni: String::new(),
            ip: String::new(),
            mac: String::new(),
            endpoint_type: EndpointType::Simple,
            status: EndpointStatus::Uninitialized,
            backends: BTreeSet::new(),
            bouncers: BTreeSet::new(),
        }
    }

    /// Build an endpoint already in `status`.
    ///
    /// Used when loading objects whose earlier history this process did
    /// not witness (bootstrap, decoding an observed resource).
    pub fn with_status(mut self, status: EndpointStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn status(&self) -> EndpointStatus {
        self.status
    }

    pub fn is_provisioned(&self) -> bool {
        self.status == EndpointStatus::Provisioned
    }

    /// Move the endpoint to `next`.
    ///
    /// Staying in the current state is allowed; otherwise only the direct
    /// successor is accepted.
    pub fn advance_to(&mut self, next: EndpointStatus) -> Result<()> {
        if next == self.status || self.status.successor() == Some(next) {
            self.status = next;
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                name: self.name.clone(),
                from: self.status,
                to: next,
            })
        }
    }

    pub fn backends(&self) -> &BTreeSet<String> {
        &self.backends
    }

    /// Replace the backend set wholesale
    pub fn set_backends(&mut self, backends: BTreeSet<String>) {
        self.backends = backends;
    }

    pub fn bouncers(&self) -> &BTreeSet<String> {
        &self.bouncers
    }

    pub(crate) fn add_bouncer(&mut self, bouncer: &Bouncer) -> Result<()> {
        check_scope(self, bouncer)?;
        self.bouncers.insert(bouncer.name.clone());
        Ok(())
    }

    pub(crate) fn remove_bouncer(&mut self, bouncer: &str) {
        self.bouncers.remove(bouncer);
    }

    pub(crate) fn clear_bouncers(&mut self) {
        self.bouncers.clear();
    }
}

pub(crate) fn check_scope(endpoint: &Endpoint, bouncer: &Bouncer) -> Result<()> {
    if endpoint.net != bouncer.net {
        return Err(CoreError::InvalidScope {
            endpoint: endpoint.name.clone(),
            endpoint_net: endpoint.net.clone(),
            bouncer: bouncer.name.clone(),
            bouncer_net: bouncer.net.clone(),
        });
    }
    Ok(())
}

/// Random locally administered hardware address for synthesized endpoints
pub fn random_mac() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "a5:5b:00:{:02x}:{:02x}:{:02x}",
        rng.gen::<u8>(),
        rng.gen::<u8>(),
        rng.gen::<u8>()
    )
}

impl TryFrom<&netmesh_api::Endpoint> for Endpoint {
    type Error = CoreError;

    fn try_from(resource: &netmesh_api::Endpoint) -> Result<Self> {
        let name = resource
            .metadata
            .name
            .clone()
            .ok_or_else(|| CoreError::InvalidResource("endpoint without a name".to_string()))?;
        let spec = &resource.spec;
        if spec.net.is_empty() {
            return Err(CoreError::InvalidResource(format!(
                "endpoint {} has no network",
                name
            )));
        }

        let status = resource
            .status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or_default();

        let mut endpoint = Endpoint::new(name, spec.net.clone())
            .with_status(status)
            .with_backends(spec.backends.iter().cloned());
        endpoint.vpc = spec.vpc.clone();
        endpoint.vni = spec.vni.clone();
        endpoint.ip = spec.ip.clone();
        endpoint.mac = spec.mac.clone();
        endpoint.endpoint_type = spec.endpoint_type;
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmesh_api::v1alpha1::{EndpointResourceStatus, EndpointSpec};

    #[test]
    fn test_lifecycle_advances_one_step_at_a_time() {
        let mut ep = Endpoint::new("svc-x", "net-A");
        assert_eq!(ep.status(), EndpointStatus::Uninitialized);

        ep.advance_to(EndpointStatus::Init).unwrap();
        ep.advance_to(EndpointStatus::Provisioned).unwrap();
        // Re-entrant
        ep.advance_to(EndpointStatus::Provisioned).unwrap();
        ep.advance_to(EndpointStatus::Deleted).unwrap();
        assert_eq!(ep.status(), EndpointStatus::Deleted);
    }

    #[test]
    fn test_lifecycle_rejects_regression() {
        let mut ep = Endpoint::new("svc-x", "net-A").with_status(EndpointStatus::Deleted);
        let err = ep.advance_to(EndpointStatus::Init).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: EndpointStatus::Deleted,
                to: EndpointStatus::Init,
                ..
            }
        ));
        assert_eq!(ep.status(), EndpointStatus::Deleted);
    }

    #[test]
    fn test_lifecycle_rejects_skipping() {
        let mut ep = Endpoint::new("svc-x", "net-A").with_status(EndpointStatus::Init);
        assert!(ep.advance_to(EndpointStatus::Deleted).is_err());
        assert_eq!(ep.status(), EndpointStatus::Init);
    }

    #[test]
    fn test_bouncer_from_other_network_is_rejected() {
        let mut ep = Endpoint::new("svc-x", "net-A");
        let lb = Bouncer::new("lb1", "net-B");
        assert!(matches!(
            ep.add_bouncer(&lb),
            Err(CoreError::InvalidScope { .. })
        ));
        assert!(ep.bouncers().is_empty());
    }

    #[test]
    fn test_random_mac_format() {
        let mac = random_mac();
        let octets: Vec<&str> = mac.split(':').collect();
        assert_eq!(octets.len(), 6);
        assert_eq!(&octets[..3], &["a5", "5b", "00"]);
        assert!(octets
            .iter()
            .all(|o| o.len() == 2 && u8::from_str_radix(o, 16).is_ok()));
    }

    #[test]
    fn test_decode_resource() {
        let mut resource = netmesh_api::Endpoint::new(
            "svc-x",
            EndpointSpec {
                vpc: "vpc0".into(),
                net: "net-A".into(),
                vni: "1".into(),
                ip: "10.0.0.5".into(),
                backends: vec!["10.1.1.1".into(), "10.1.1.1".into()],
                ..Default::default()
            },
        );
        resource.status = Some(EndpointResourceStatus {
            phase: EndpointStatus::Provisioned,
            ..Default::default()
        });

        let ep = Endpoint::try_from(&resource).unwrap();
        assert_eq!(ep.name, "svc-x");
        assert_eq!(ep.net, "net-A");
        assert!(ep.is_provisioned());
        assert_eq!(ep.backends().len(), 1);
    }

    #[test]
    fn test_decode_rejects_missing_network() {
        let resource = netmesh_api::Endpoint::new("svc-x", EndpointSpec::default());
        assert!(matches!(
            Endpoint::try_from(&resource),
            Err(CoreError::InvalidResource(_))
        ));
    }
}
