//! Endpoint controller for reconciling Endpoint resources

use crate::context::{shutdown_signal, Context, ReconcileError};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event as Finalizer};
use kube_runtime::Controller;
use netmesh_api::Endpoint as EndpointResource;
use netmesh_api::EndpointType;
use netmesh_core::{CoreError, Endpoint};
use netmesh_kube::convert::bouncers_outdated;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const ENDPOINT_FINALIZER: &str = "netmesh.io/endpoint";

pub struct EndpointController {
    client: Client,
    context: Arc<Context>,
}

impl EndpointController {
    pub fn new(client: Client, context: Arc<Context>) -> Self {
        Self { client, context }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting Endpoint reconciliation");

        let endpoints: Api<EndpointResource> =
            Api::namespaced(self.client.clone(), &self.context.namespace);

        let mut stream = Controller::new(endpoints, Default::default())
            .run(reconcile, error_policy, self.context)
            .take_until(shutdown_signal(shutdown))
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((obj, _)) => debug!("Reconciled Endpoint {}", obj.name),
                Err(e) => error!("Error in Endpoint reconciliation stream: {}", e),
            }
        }

        info!("Endpoint reconciliation stopped");
        Ok(())
    }
}

async fn reconcile(
    resource: Arc<EndpointResource>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let api: Api<EndpointResource> = Api::namespaced(ctx.gateway.client(), &ctx.namespace);

    finalizer(&api, ENDPOINT_FINALIZER, resource, |event| async {
        match event {
            Finalizer::Apply(resource) => apply(&resource, &ctx).await,
            Finalizer::Cleanup(resource) => {
                ctx.reconciler.on_endpoint_deleted(&resource.name_any()).await?;
                Ok(Action::await_change())
            }
        }
    })
    .await
    .map_err(ReconcileError::from)
}

async fn apply(resource: &EndpointResource, ctx: &Context) -> Result<Action, CoreError> {
    let endpoint = match Endpoint::try_from(resource) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("Ignoring Endpoint {}: {}", resource.name_any(), e);
            return Ok(Action::await_change());
        }
    };

    debug!(
        "Reconciling Endpoint {} ({}) in network {}",
        endpoint.name,
        endpoint.status(),
        endpoint.net
    );
    let Some(stored) = ctx.reconciler.on_endpoint_observed(endpoint).await? else {
        return Ok(Action::await_change());
    };
    if bouncers_outdated(resource, stored.bouncers()) {
        ctx.gateway.publish_endpoint_bouncers(&stored).await?;
    }

    // Backend updates that arrived before the endpoint was stored were dropped
    if stored.endpoint_type == EndpointType::Scaled && stored.backends().is_empty() {
        let config = ctx.reconciler.config();
        if let Some(groups) = ctx
            .gateway
            .managed_backends(&stored.name, &config.annotation_key, &config.annotation_value)
            .await?
        {
            ctx.reconciler
                .on_backend_groups_updated(&stored.name, &groups)
                .await?;
        }
    }
    Ok(Action::await_change())
}

fn error_policy(
    resource: Arc<EndpointResource>,
    e: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    error!("Error reconciling Endpoint {}: {}", resource.name_any(), e);
    Action::requeue(Duration::from_secs(60))
}
