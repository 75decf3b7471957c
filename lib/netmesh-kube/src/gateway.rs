//! Gateway implementation backed by the Kubernetes API

use crate::convert::{
    backend_groups, bouncers_patch, is_managed, phase_patch, set_annotation, to_resource,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Endpoints;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use netmesh_api::EndpointStatus;
use netmesh_core::{BackendGroup, Bouncer, CoreError, Endpoint, Gateway, Result, RetryPolicy};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// KubeGateway persists reconciler decisions as Kubernetes objects
pub struct KubeGateway {
    client: Client,
    namespace: String,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl KubeGateway {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        retry: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            retry,
            shutdown,
        }
    }

    /// Get a clone of the Kubernetes client
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn endpoints(&self) -> Api<netmesh_api::Endpoint> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// List and decode every endpoint resource in the namespace.
    /// Resources that fail to decode are logged and skipped.
    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let list = self.endpoints().list(&ListParams::default()).await?;
        debug!("Listed {} endpoint resources", list.items.len());

        let endpoints = list
            .items
            .iter()
            .filter_map(|resource| match Endpoint::try_from(resource) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!("Skipping endpoint resource: {}", e);
                    None
                }
            })
            .collect();
        Ok(endpoints)
    }

    /// Backend groups of the built-in endpoints object `name`, if it exists
    /// and carries the managed annotation
    pub async fn managed_backends(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<Vec<BackendGroup>>> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), &self.namespace);
        let groups = api
            .get_opt(name)
            .await?
            .filter(|obj| is_managed(obj, key, value))
            .map(|obj| backend_groups(&obj));
        Ok(groups)
    }

    /// Record the endpoints a bouncer serves in its status
    pub async fn publish_bouncer_status(&self, bouncer: &Bouncer) -> Result<()> {
        let api: Api<netmesh_api::Bouncer> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = json!({
            "status": {
                "endpoints": bouncer.endpoints(),
                "endpointCount": bouncer.endpoints().len(),
            }
        });
        match api
            .patch_status(&bouncer.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                Err(CoreError::BouncerNotFound(bouncer.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record the bouncers serving a stored endpoint in its status
    pub async fn publish_endpoint_bouncers(&self, endpoint: &Endpoint) -> Result<()> {
        let patch = bouncers_patch(endpoint);
        match self
            .endpoints()
            .patch_status(&endpoint.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                Err(CoreError::EndpointNotFound(endpoint.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_phase(&self, endpoint: &Endpoint, phase: EndpointStatus) -> Result<()> {
        let patch = phase_patch(phase, &chrono::Utc::now().to_rfc3339());
        match self
            .endpoints()
            .patch_status(&endpoint.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                Err(CoreError::EndpointNotFound(endpoint.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Gateway for KubeGateway {
    async fn confirm_endpoint_provisioned(&self, endpoint: &Endpoint) -> Result<()> {
        self.patch_phase(endpoint, EndpointStatus::Provisioned).await
    }

    async fn annotate_managed_object(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let target = format!("endpoints {}/{}", namespace, name);

        self.retry
            .run_if(&target, &self.shutdown, annotation_retryable, || {
                let api = api.clone();
                async move {
                    let mut object = match api.get(name).await {
                        Ok(object) => object,
                        Err(kube::Error::Api(resp)) if resp.code == 404 => {
                            return Err(CoreError::EndpointNotFound(name.to_string()));
                        }
                        Err(e) => return Err(e.into()),
                    };
                    if !set_annotation(&mut object.metadata, key, value) {
                        return Ok(());
                    }
                    // Conditional on the resourceVersion read above
                    api.replace(name, &PostParams::default(), &object).await?;
                    Ok::<(), CoreError>(())
                }
            })
            .await?;

        debug!("Annotated {} with {}={}", target, key, value);
        Ok(())
    }

    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        let resource = to_resource(endpoint);
        match self.endpoints().create(&PostParams::default(), &resource).await {
            Ok(_) => info!("Created endpoint resource {}", endpoint.name),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                debug!("Endpoint resource {} already exists", endpoint.name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        // Status is a subresource and is dropped on create
        self.patch_phase(endpoint, endpoint.status()).await
    }

    async fn delete_endpoint(&self, name: &str) -> Result<()> {
        match self.endpoints().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted endpoint resource {}", name);
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!("Endpoint resource {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Errors worth retrying while annotating a built-in endpoints object. The
/// object may not exist yet right after its service is created.
fn annotation_retryable(e: &CoreError) -> bool {
    e.is_conflict() || matches!(e, CoreError::EndpointNotFound(_))
}
