//! Shared state for the operator's controllers

use netmesh_core::{CoreError, Reconciler};
use netmesh_kube::KubeGateway;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Error, Debug)]
#[error("Reconciliation error: {0}")]
pub struct ReconcileError(pub String);

impl From<CoreError> for ReconcileError {
    fn from(e: CoreError) -> Self {
        ReconcileError(e.to_string())
    }
}

impl<E: std::error::Error + 'static> From<kube_runtime::finalizer::Error<E>> for ReconcileError {
    fn from(e: kube_runtime::finalizer::Error<E>) -> Self {
        ReconcileError(e.to_string())
    }
}

/// Context handed to every reconcile call
pub struct Context {
    pub reconciler: Arc<Reconciler>,
    pub gateway: Arc<KubeGateway>,
    pub namespace: String,
}

impl Context {
    /// Record the serving bouncers of every stored endpoint of `net`
    pub async fn publish_network_endpoints(&self, net: &str) -> Result<(), CoreError> {
        for endpoint in self.reconciler.store().get_endpoints_in_network(net).await {
            match self.gateway.publish_endpoint_bouncers(&endpoint).await {
                Ok(()) => {}
                Err(CoreError::EndpointNotFound(name)) => {
                    debug!("Endpoint resource {} is gone; skipping status", name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Resolves once `shutdown` turns true or its sender is dropped
pub async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
