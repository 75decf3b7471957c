//! Bidirectional endpoint/bouncer reconciliation

use crate::backend::{merge_backend_groups, BackendGroup};
use crate::endpoint::random_mac;
use crate::store::NetworkGuard;
use crate::{Bouncer, Endpoint, Gateway, ReconcilerConfig, Result, Store};
use netmesh_api::{EndpointStatus, EndpointType};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciler keeps the bouncers of every network in sync with the
/// endpoints of that network.
///
/// Each propagation runs entirely under the lock of the affected network.
/// Gateway calls are made before the lock is taken.
pub struct Reconciler {
    store: Arc<Store>,
    gateway: Arc<dyn Gateway>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(store: Arc<Store>, gateway: Arc<dyn Gateway>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Load endpoints that were provisioned before this process started.
    /// Returns how many were loaded.
    pub async fn bootstrap<I>(&self, endpoints: I) -> Result<usize>
    where
        I: IntoIterator<Item = Endpoint>,
    {
        let mut loaded = 0;
        for endpoint in endpoints {
            if !endpoint.is_provisioned() {
                continue;
            }
            info!("Bootstrapped endpoint {}", endpoint.name);
            self.store_endpoint(endpoint).await?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Handle an endpoint create/update notification.
    ///
    /// Endpoints in `Init` are confirmed provisioned through the gateway
    /// and then stored. Provisioned endpoints are stored directly. Returns
    /// the stored endpoint, or `None` if the notification was ignored.
    pub async fn on_endpoint_observed(&self, mut endpoint: Endpoint) -> Result<Option<Endpoint>> {
        match endpoint.status() {
            EndpointStatus::Init => {
                endpoint.advance_to(EndpointStatus::Provisioned)?;
                self.gateway.confirm_endpoint_provisioned(&endpoint).await?;
                info!("Endpoint {} provisioned", endpoint.name);
                self.store_endpoint(endpoint).await.map(Some)
            }
            EndpointStatus::Provisioned => self.store_endpoint(endpoint).await.map(Some),
            status => {
                debug!("Ignoring endpoint {} in status {}", endpoint.name, status);
                Ok(None)
            }
        }
    }

    /// Handle an endpoint deletion. Returns the removed endpoint, now in
    /// `Deleted`, or `None` if it was not stored.
    pub async fn on_endpoint_deleted(&self, name: &str) -> Result<Option<Endpoint>> {
        let Some(net) = self.store.network_of_endpoint(name).await else {
            debug!("Deleted endpoint {} was not stored", name);
            return Ok(None);
        };

        let Some(mut endpoint) = self.detach_endpoint(&net, name).await else {
            return Ok(None);
        };
        endpoint.advance_to(EndpointStatus::Deleted)?;
        info!("Endpoint {} removed from network {}", name, net);
        Ok(Some(endpoint))
    }

    /// Replace the backends of an endpoint with the union of `groups`
    /// and republish it to its network. Returns `None` if the endpoint is
    /// not stored.
    pub async fn on_backend_groups_updated(
        &self,
        name: &str,
        groups: &[BackendGroup],
    ) -> Result<Option<Endpoint>> {
        let merge = merge_backend_groups(groups);
        if !merge.skipped.is_empty() {
            warn!(
                "Endpoint {}: skipped {} malformed backend group(s)",
                name,
                merge.skipped.len()
            );
        }

        // The endpoint may move between the index read and the lock; the
        // network is resolved a second time before giving up.
        let mut resolved = None;
        for _ in 0..2 {
            let Some(net) = self.store.network_of_endpoint(name).await else {
                break;
            };
            let network = self.store.network(&net).await;
            if let Some(endpoint) = network.endpoint(name) {
                resolved = Some((network, endpoint));
                break;
            }
            debug!(
                "Endpoint {} left network {} before its backend update",
                name, net
            );
        }
        let Some((mut network, mut endpoint)) = resolved else {
            debug!("No stored endpoint {}; ignoring backend update", name);
            return Ok(None);
        };
        endpoint.set_backends(merge.backends);
        let endpoint = publish_endpoint(&mut network, endpoint).await?;
        info!(
            "Updated endpoint {} with backends: {:?}",
            name,
            endpoint.backends()
        );
        Ok(Some(endpoint))
    }

    /// Handle a bouncer create/update notification: the bouncer mirrors
    /// every endpoint of its network.
    pub async fn on_bouncer_observed(&self, bouncer: Bouncer) -> Result<Bouncer> {
        if let Some(previous) = self.store.network_of_bouncer(&bouncer.name).await {
            if previous != bouncer.net {
                info!(
                    "Bouncer {} moved from network {} to {}",
                    bouncer.name, previous, bouncer.net
                );
                self.detach_bouncer(&previous, &bouncer.name).await;
            }
        }

        let mut network = self.store.network(&bouncer.net).await;
        let mut bouncer = bouncer;
        bouncer.clear_endpoints();

        let mut endpoints = network.endpoints();
        bouncer.update_endpoints(endpoints.iter())?;
        for endpoint in &mut endpoints {
            endpoint.add_bouncer(&bouncer)?;
        }
        for endpoint in endpoints {
            network.upsert_endpoint(endpoint).await?;
        }
        network.upsert_bouncer(bouncer.clone()).await?;

        info!(
            "Bouncer {} in network {} serves {} endpoint(s)",
            bouncer.name,
            bouncer.net,
            bouncer.endpoints().len()
        );
        Ok(bouncer)
    }

    /// Handle a bouncer deletion. Returns the removed bouncer, or `None`
    /// if it was not stored.
    pub async fn on_bouncer_deleted(&self, name: &str) -> Result<Option<Bouncer>> {
        let Some(net) = self.store.network_of_bouncer(name).await else {
            debug!("Deleted bouncer {} was not stored", name);
            return Ok(None);
        };
        let bouncer = self.detach_bouncer(&net, name).await;
        if bouncer.is_some() {
            info!("Bouncer {} removed from network {}", name, net);
        }
        Ok(bouncer)
    }

    /// Synthesize an endpoint for a service with a cluster IP and mark the
    /// service's built-in endpoints object as managed. Returns the created
    /// endpoint, or `None` for headless or already known services.
    pub async fn on_scaled_service_observed(
        &self,
        name: &str,
        namespace: &str,
        cluster_ip: Option<&str>,
    ) -> Result<Option<Endpoint>> {
        let ip = match cluster_ip {
            Some(ip) if !ip.is_empty() && ip != "None" => ip,
            _ => {
                debug!("Service {}/{} has no cluster IP", namespace, name);
                return Ok(None);
            }
        };
        if self.store.get(name).await.is_some() {
            debug!("Scaled endpoint {} already exists", name);
            return Ok(None);
        }

        let mut endpoint = Endpoint::new(name, self.config.default_net.as_str());
        endpoint.vpc = self.config.default_vpc.clone();
        endpoint.vni = self.config.default_vni.clone();
        endpoint.ip = ip.to_string();
        endpoint.mac = random_mac();
        endpoint.endpoint_type = EndpointType::Scaled;
        endpoint.advance_to(EndpointStatus::Init)?;

        info!("Create scaled endpoint {} with ip {}", name, ip);
        self.gateway.create_endpoint(&endpoint).await?;
        self.gateway
            .annotate_managed_object(
                name,
                namespace,
                &self.config.annotation_key,
                &self.config.annotation_value,
            )
            .await?;
        Ok(Some(endpoint))
    }

    /// Delete the endpoint object synthesized for a service. Endpoints
    /// of any other type sharing the service's name are left alone.
    pub async fn on_scaled_service_deleted(&self, name: &str) -> Result<()> {
        match self.store.get(name).await {
            Some(endpoint) if endpoint.endpoint_type == EndpointType::Scaled => {
                info!("Delete scaled endpoint {}", name);
                self.gateway.delete_endpoint(name).await
            }
            Some(endpoint) => {
                debug!(
                    "Endpoint {} is {}, not deleting it with its service",
                    name, endpoint.endpoint_type
                );
                Ok(())
            }
            None => {
                debug!("Service {} has no scaled endpoint", name);
                Ok(())
            }
        }
    }

    async fn store_endpoint(&self, mut endpoint: Endpoint) -> Result<Endpoint> {
        if let Some(previous) = self.store.network_of_endpoint(&endpoint.name).await {
            if previous != endpoint.net {
                info!(
                    "Endpoint {} moved from network {} to {}",
                    endpoint.name, previous, endpoint.net
                );
                self.detach_endpoint(&previous, &endpoint.name).await;
            }
        }

        let mut network = self.store.network(&endpoint.net).await;
        if let Some(stored) = network.endpoint(&endpoint.name) {
            // Merged backends of scaled endpoints only come from backend updates
            if endpoint.endpoint_type == EndpointType::Scaled {
                endpoint.set_backends(stored.backends().clone());
            }
        }
        publish_endpoint(&mut network, endpoint).await
    }

    async fn detach_endpoint(&self, net: &str, name: &str) -> Option<Endpoint> {
        let mut network = self.store.network(net).await;
        let served_by = network.endpoint(name)?.bouncers().len();
        let endpoint = network.detach_endpoint(name).await?;
        debug!(
            "Detached endpoint {} from {} bouncer(s) in network {}",
            name, served_by, net
        );
        Some(endpoint)
    }

    async fn detach_bouncer(&self, net: &str, name: &str) -> Option<Bouncer> {
        let mut network = self.store.network(net).await;
        let served = network.bouncer(name)?.endpoints().len();
        let bouncer = network.detach_bouncer(name).await?;
        debug!(
            "Detached bouncer {} from {} endpoint(s) in network {}",
            name, served, net
        );
        Some(bouncer)
    }
}

/// Write an endpoint into its locked network and make every bouncer of
/// the network serve it.
async fn publish_endpoint(network: &mut NetworkGuard<'_>, mut endpoint: Endpoint) -> Result<Endpoint> {
    endpoint.clear_bouncers();
    let mut bouncers = network.bouncers();
    for bouncer in &mut bouncers {
        bouncer.update_endpoints([&endpoint])?;
        endpoint.add_bouncer(bouncer)?;
    }
    for bouncer in bouncers {
        network.upsert_bouncer(bouncer).await?;
    }
    network.upsert_endpoint(endpoint.clone()).await?;
    debug!(
        "Endpoint {} published to {} bouncer(s) in network {}",
        endpoint.name,
        endpoint.bouncers().len(),
        network.net()
    );
    Ok(endpoint)
}
