//! Outbound calls from the reconciler to the orchestration platform

use crate::{Endpoint, Result};
use async_trait::async_trait;

/// Gateway persists reconciler decisions to the platform.
///
/// Implementations may block on network I/O; the reconciler never calls
/// them while holding a network lock.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Persist the provisioned status of an endpoint
    async fn confirm_endpoint_provisioned(&self, endpoint: &Endpoint) -> Result<()>;

    /// Set an annotation on an externally-owned object, retrying on write
    /// conflicts within a bounded policy
    async fn annotate_managed_object(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Create the platform object for a synthesized endpoint.
    /// Succeeds if the object already exists.
    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<()>;

    /// Delete the platform object of an endpoint. Succeeds if it is absent.
    async fn delete_endpoint(&self, name: &str) -> Result<()>;
}
