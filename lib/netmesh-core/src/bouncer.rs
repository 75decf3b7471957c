//! Bouncer entity

use crate::endpoint::check_scope;
use crate::{CoreError, Endpoint, Result};
use std::collections::BTreeSet;

/// A load-balancing front-end for a single network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bouncer {
    pub name: String,
    pub vpc: String,
    pub net: String,
    pub ip: String,
    endpoints: BTreeSet<String>,
}

impl Bouncer {
    pub fn new(name: impl Into<String>, net: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vpc: String::new(),
            net: net.into(),
            ip: String::new(),
            endpoints: BTreeSet::new(),
        }
    }

    pub fn endpoints(&self) -> &BTreeSet<String> {
        &self.endpoints
    }

    /// Add endpoints to the served set. Fails without modifying the
    /// bouncer if any endpoint is outside its network.
    pub(crate) fn update_endpoints<'a, I>(&mut self, endpoints: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Endpoint>,
    {
        let endpoints: Vec<&Endpoint> = endpoints.into_iter().collect();
        for ep in &endpoints {
            check_scope(ep, self)?;
        }
        self.endpoints
            .extend(endpoints.into_iter().map(|ep| ep.name.clone()));
        Ok(())
    }

    pub(crate) fn delete_endpoints<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            self.endpoints.remove(name);
        }
    }

    pub(crate) fn clear_endpoints(&mut self) {
        self.endpoints.clear();
    }
}

impl TryFrom<&netmesh_api::Bouncer> for Bouncer {
    type Error = CoreError;

    fn try_from(resource: &netmesh_api::Bouncer) -> Result<Self> {
        let name = resource
            .metadata
            .name
            .clone()
            .ok_or_else(|| CoreError::InvalidResource("bouncer without a name".to_string()))?;
        if resource.spec.net.is_empty() {
            return Err(CoreError::InvalidResource(format!(
                "bouncer {} has no network",
                name
            )));
        }

        let mut bouncer = Bouncer::new(name, resource.spec.net.clone());
        bouncer.vpc = resource.spec.vpc.clone();
        bouncer.ip = resource.spec.ip.clone();
        Ok(bouncer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_endpoints_is_all_or_nothing() {
        let mut lb = Bouncer::new("lb1", "net-A");
        let a = Endpoint::new("a", "net-A");
        let b = Endpoint::new("b", "net-B");

        let err = lb.update_endpoints([&a, &b]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidScope { .. }));
        assert!(lb.endpoints().is_empty());

        lb.update_endpoints([&a]).unwrap();
        lb.update_endpoints([&a]).unwrap();
        assert_eq!(lb.endpoints().len(), 1);
    }

    #[test]
    fn test_delete_endpoints() {
        let mut lb = Bouncer::new("lb1", "net-A");
        let a = Endpoint::new("a", "net-A");
        let b = Endpoint::new("b", "net-A");
        lb.update_endpoints([&a, &b]).unwrap();

        lb.delete_endpoints(["a", "missing"]);
        assert_eq!(lb.endpoints().iter().collect::<Vec<_>>(), vec!["b"]);
    }
}
