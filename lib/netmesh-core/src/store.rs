//! Network-scoped store of endpoints and bouncers

use crate::{Bouncer, CoreError, Endpoint, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// Store maintains the endpoints and bouncers known to exist in each network.
///
/// Every network has its own lock; holding a [`NetworkGuard`] serializes
/// all membership changes for that network without blocking others. The
/// name indexes are only held for short, non-awaiting sections and never
/// while waiting on a network lock.
pub struct Store {
    networks: RwLock<HashMap<String, Arc<Mutex<NetworkState>>>>,
    // Name of endpoint/bouncer to the network it is stored under
    endpoint_nets: RwLock<HashMap<String, String>>,
    bouncer_nets: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Default)]
struct NetworkState {
    endpoints: HashMap<String, Endpoint>,
    bouncers: HashMap<String, Bouncer>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            networks: RwLock::new(HashMap::new()),
            endpoint_nets: RwLock::new(HashMap::new()),
            bouncer_nets: RwLock::new(HashMap::new()),
        }
    }

    /// Lock a network for exclusive access, creating it if needed
    pub async fn network(&self, net: &str) -> NetworkGuard<'_> {
        let cell = self.network_cell(net).await;
        let state = cell.lock_owned().await;
        NetworkGuard {
            net: net.to_string(),
            state,
            store: self,
        }
    }

    async fn network_cell(&self, net: &str) -> Arc<Mutex<NetworkState>> {
        if let Some(cell) = self.networks.read().await.get(net) {
            return cell.clone();
        }
        let mut networks = self.networks.write().await;
        networks
            .entry(net.to_string())
            .or_insert_with(|| {
                debug!("Created network entry: {}", net);
                Arc::new(Mutex::new(NetworkState::default()))
            })
            .clone()
    }

    async fn existing_network(&self, net: &str) -> Option<NetworkGuard<'_>> {
        let cell = self.networks.read().await.get(net).cloned()?;
        Some(NetworkGuard {
            net: net.to_string(),
            state: cell.lock_owned().await,
            store: self,
        })
    }

    /// Network an endpoint is currently stored under
    pub async fn network_of_endpoint(&self, name: &str) -> Option<String> {
        self.endpoint_nets.read().await.get(name).cloned()
    }

    /// Network a bouncer is currently stored under
    pub async fn network_of_bouncer(&self, name: &str) -> Option<String> {
        self.bouncer_nets.read().await.get(name).cloned()
    }

    /// Get an endpoint by name
    pub async fn get(&self, name: &str) -> Option<Endpoint> {
        let net = self.network_of_endpoint(name).await?;
        self.existing_network(&net).await?.endpoint(name)
    }

    /// Get a bouncer by name
    pub async fn get_bouncer(&self, name: &str) -> Option<Bouncer> {
        let net = self.network_of_bouncer(name).await?;
        self.existing_network(&net).await?.bouncer(name)
    }

    /// Snapshot of the endpoints in a network
    pub async fn get_endpoints_in_network(&self, net: &str) -> Vec<Endpoint> {
        match self.existing_network(net).await {
            Some(guard) => guard.endpoints(),
            None => Vec::new(),
        }
    }

    /// Snapshot of the bouncers in a network
    pub async fn get_bouncers_in_network(&self, net: &str) -> Vec<Bouncer> {
        match self.existing_network(net).await {
            Some(guard) => guard.bouncers(),
            None => Vec::new(),
        }
    }

    /// Insert or replace an endpoint in its network.
    ///
    /// An endpoint stored under another network is first deleted there,
    /// detaching it from that network's bouncers, and enters the new
    /// network without associations. The two networks are never locked
    /// at the same time.
    pub async fn upsert_endpoint(&self, mut endpoint: Endpoint) -> Result<()> {
        let net = endpoint.net.clone();
        if let Some(previous) = self.network_of_endpoint(&endpoint.name).await {
            if previous != net {
                debug!(
                    "Moving endpoint {} from network {} to {}",
                    endpoint.name, previous, net
                );
                self.delete_endpoint(&endpoint.name).await;
                endpoint.clear_bouncers();
            }
        }
        self.network(&net).await.upsert_endpoint(endpoint).await
    }

    /// Insert or replace a bouncer in its network, moving it out of the
    /// network it was stored under like [`Store::upsert_endpoint`]
    pub async fn upsert_bouncer(&self, mut bouncer: Bouncer) -> Result<()> {
        let net = bouncer.net.clone();
        if let Some(previous) = self.network_of_bouncer(&bouncer.name).await {
            if previous != net {
                debug!(
                    "Moving bouncer {} from network {} to {}",
                    bouncer.name, previous, net
                );
                self.delete_bouncer(&bouncer.name).await;
                bouncer.clear_endpoints();
            }
        }
        self.network(&net).await.upsert_bouncer(bouncer).await
    }

    /// Remove an endpoint and detach it from the bouncers of its network.
    /// Returns `None` if the endpoint is unknown.
    pub async fn delete_endpoint(&self, name: &str) -> Option<Endpoint> {
        let net = self.network_of_endpoint(name).await?;
        self.existing_network(&net)
            .await?
            .detach_endpoint(name)
            .await
    }

    /// Remove a bouncer and detach it from the endpoints of its network.
    /// Returns `None` if the bouncer is unknown.
    pub async fn delete_bouncer(&self, name: &str) -> Option<Bouncer> {
        let net = self.network_of_bouncer(name).await?;
        self.existing_network(&net)
            .await?
            .detach_bouncer(name)
            .await
    }

    /// Names of all networks that have been seen
    pub async fn networks(&self) -> Vec<String> {
        self.networks.read().await.keys().cloned().collect()
    }

    pub async fn endpoint_count(&self) -> usize {
        self.endpoint_nets.read().await.len()
    }

    pub async fn bouncer_count(&self) -> usize {
        self.bouncer_nets.read().await.len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to a single network of the [`Store`].
///
/// All reads return owned copies, so iterating a snapshot while writing
/// through the guard is safe.
pub struct NetworkGuard<'a> {
    net: String,
    state: OwnedMutexGuard<NetworkState>,
    store: &'a Store,
}

impl NetworkGuard<'_> {
    pub fn net(&self) -> &str {
        &self.net
    }

    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.state.endpoints.get(name).cloned()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.endpoints.values().cloned().collect()
    }

    pub fn bouncer(&self, name: &str) -> Option<Bouncer> {
        self.state.bouncers.get(name).cloned()
    }

    pub fn bouncers(&self) -> Vec<Bouncer> {
        self.state.bouncers.values().cloned().collect()
    }

    fn check_net(&self, kind: &'static str, name: &str, net: &str) -> Result<()> {
        if net != self.net {
            return Err(CoreError::NetworkMismatch {
                kind,
                name: name.to_string(),
                expected: self.net.clone(),
                actual: net.to_string(),
            });
        }
        Ok(())
    }

    /// Insert or replace an endpoint.
    ///
    /// Fails if the endpoint belongs to a different network or is still
    /// stored under another one.
    pub async fn upsert_endpoint(&mut self, endpoint: Endpoint) -> Result<()> {
        self.check_net("endpoint", &endpoint.name, &endpoint.net)?;
        {
            let mut index = self.store.endpoint_nets.write().await;
            if let Some(current) = index.get(&endpoint.name) {
                self.check_net("endpoint", &endpoint.name, current)?;
            }
            index.insert(endpoint.name.clone(), self.net.clone());
        }
        self.state
            .endpoints
            .insert(endpoint.name.clone(), endpoint);
        Ok(())
    }

    /// Insert or replace a bouncer.
    ///
    /// Fails if the bouncer belongs to a different network or is still
    /// stored under another one.
    pub async fn upsert_bouncer(&mut self, bouncer: Bouncer) -> Result<()> {
        self.check_net("bouncer", &bouncer.name, &bouncer.net)?;
        {
            let mut index = self.store.bouncer_nets.write().await;
            if let Some(current) = index.get(&bouncer.name) {
                self.check_net("bouncer", &bouncer.name, current)?;
            }
            index.insert(bouncer.name.clone(), self.net.clone());
        }
        self.state.bouncers.insert(bouncer.name.clone(), bouncer);
        Ok(())
    }

    /// Remove an endpoint, dropping its membership from every bouncer of
    /// this network. The returned endpoint has no bouncers left.
    pub async fn detach_endpoint(&mut self, name: &str) -> Option<Endpoint> {
        let mut endpoint = self.state.endpoints.remove(name)?;
        self.store.endpoint_nets.write().await.remove(name);

        for bouncer in self.state.bouncers.values_mut() {
            bouncer.delete_endpoints([name]);
        }
        endpoint.clear_bouncers();
        Some(endpoint)
    }

    /// Remove a bouncer, dropping it from every endpoint of this network.
    /// The returned bouncer serves no endpoints.
    pub async fn detach_bouncer(&mut self, name: &str) -> Option<Bouncer> {
        let mut bouncer = self.state.bouncers.remove(name)?;
        self.store.bouncer_nets.write().await.remove(name);

        for endpoint in self.state.endpoints.values_mut() {
            endpoint.remove_bouncer(name);
        }
        bouncer.clear_endpoints();
        Some(bouncer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = Store::new();
        store
            .upsert_endpoint(Endpoint::new("svc-x", "net-A"))
            .await
            .unwrap();

        let ep = store.get("svc-x").await.unwrap();
        assert_eq!(ep.net, "net-A");
        assert!(store.get("svc-y").await.is_none());
        assert_eq!(store.endpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_name() {
        let store = Store::new();
        let mut ep = Endpoint::new("svc-x", "net-A");
        store.upsert_endpoint(ep.clone()).await.unwrap();

        ep.ip = "10.0.0.7".to_string();
        store.upsert_endpoint(ep).await.unwrap();

        assert_eq!(store.get_endpoints_in_network("net-A").await.len(), 1);
        assert_eq!(store.get("svc-x").await.unwrap().ip, "10.0.0.7");
    }

    #[tokio::test]
    async fn test_network_isolation() {
        let store = Store::new();
        for (name, net) in [("a1", "net-A"), ("a2", "net-A"), ("b1", "net-B")] {
            store
                .upsert_endpoint(Endpoint::new(name, net))
                .await
                .unwrap();
        }
        store
            .upsert_bouncer(Bouncer::new("lb-b", "net-B"))
            .await
            .unwrap();

        let in_a = store.get_endpoints_in_network("net-A").await;
        assert_eq!(in_a.len(), 2);
        assert!(in_a.iter().all(|ep| ep.net == "net-A"));

        let in_b = store.get_endpoints_in_network("net-B").await;
        assert_eq!(in_b.len(), 1);
        assert!(in_b.iter().all(|ep| ep.net == "net-B"));

        assert!(store.get_bouncers_in_network("net-A").await.is_empty());
        assert!(store.get_endpoints_in_network("net-C").await.is_empty());
    }

    #[tokio::test]
    async fn test_guard_rejects_foreign_network() {
        let store = Store::new();
        let mut guard = store.network("net-A").await;
        let err = guard
            .upsert_endpoint(Endpoint::new("b1", "net-B"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NetworkMismatch { .. }));
        assert!(guard.endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_guard_rejects_entity_stored_elsewhere() {
        let store = Store::new();
        store
            .upsert_endpoint(Endpoint::new("svc-x", "net-A"))
            .await
            .unwrap();

        let err = store
            .network("net-B")
            .await
            .upsert_endpoint(Endpoint::new("svc-x", "net-B"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NetworkMismatch { .. }));
        assert_eq!(store.network_of_endpoint("svc-x").await.unwrap(), "net-A");
        assert!(store.get_endpoints_in_network("net-B").await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_moves_endpoint_between_networks() {
        let store = Store::new();
        let mut ep = Endpoint::new("svc-x", "net-A");
        {
            let mut guard = store.network("net-A").await;
            let mut lb = Bouncer::new("lb1", "net-A");
            ep.add_bouncer(&lb).unwrap();
            lb.update_endpoints([&ep]).unwrap();
            guard.upsert_endpoint(ep.clone()).await.unwrap();
            guard.upsert_bouncer(lb).await.unwrap();
        }

        ep.net = "net-B".to_string();
        store.upsert_endpoint(ep).await.unwrap();

        let moved = store.get("svc-x").await.unwrap();
        assert_eq!(moved.net, "net-B");
        assert!(moved.bouncers().is_empty());
        assert_eq!(store.network_of_endpoint("svc-x").await.unwrap(), "net-B");
        assert!(store.get_endpoints_in_network("net-A").await.is_empty());
        assert!(store.get_bouncer("lb1").await.unwrap().endpoints().is_empty());
        assert_eq!(store.endpoint_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_moves_bouncer_between_networks() {
        let store = Store::new();
        store
            .upsert_bouncer(Bouncer::new("lb1", "net-A"))
            .await
            .unwrap();
        store
            .upsert_bouncer(Bouncer::new("lb1", "net-B"))
            .await
            .unwrap();

        assert_eq!(store.network_of_bouncer("lb1").await.unwrap(), "net-B");
        assert!(store.get_bouncers_in_network("net-A").await.is_empty());
        assert_eq!(store.get_bouncers_in_network("net-B").await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_noop_when_absent() {
        let store = Store::new();
        assert!(store.delete_endpoint("missing").await.is_none());
        assert!(store.delete_bouncer("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_detaches_peers() {
        let store = Store::new();
        {
            let mut guard = store.network("net-A").await;
            let mut ep = Endpoint::new("svc-x", "net-A");
            let mut lb = Bouncer::new("lb1", "net-A");
            ep.add_bouncer(&lb).unwrap();
            lb.update_endpoints([&ep]).unwrap();
            guard.upsert_endpoint(ep).await.unwrap();
            guard.upsert_bouncer(lb).await.unwrap();
        }

        let removed = store.delete_bouncer("lb1").await.unwrap();
        assert!(removed.endpoints().is_empty());
        assert!(store.get("svc-x").await.unwrap().bouncers().is_empty());
        assert!(store.get_bouncer("lb1").await.is_none());
        assert_eq!(store.bouncer_count().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_of_later_writes() {
        let store = Store::new();
        store
            .upsert_endpoint(Endpoint::new("a1", "net-A"))
            .await
            .unwrap();

        let snapshot = store.get_endpoints_in_network("net-A").await;
        store.delete_endpoint("a1").await.unwrap();
        store
            .upsert_endpoint(Endpoint::new("a2", "net-A"))
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "a1");
    }
}
