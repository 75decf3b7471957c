//! Bouncer controller for reconciling Bouncer resources

use crate::context::{shutdown_signal, Context, ReconcileError};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event as Finalizer};
use kube_runtime::Controller;
use netmesh_api::Bouncer as BouncerResource;
use netmesh_core::{Bouncer, CoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const BOUNCER_FINALIZER: &str = "netmesh.io/bouncer";

pub struct BouncerController {
    client: Client,
    context: Arc<Context>,
}

impl BouncerController {
    pub fn new(client: Client, context: Arc<Context>) -> Self {
        Self { client, context }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting Bouncer reconciliation");

        let bouncers: Api<BouncerResource> =
            Api::namespaced(self.client.clone(), &self.context.namespace);

        let mut stream = Controller::new(bouncers, Default::default())
            .run(reconcile, error_policy, self.context)
            .take_until(shutdown_signal(shutdown))
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((obj, _)) => debug!("Reconciled Bouncer {}", obj.name),
                Err(e) => error!("Error in Bouncer reconciliation stream: {}", e),
            }
        }

        info!("Bouncer reconciliation stopped");
        Ok(())
    }
}

async fn reconcile(
    resource: Arc<BouncerResource>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let api: Api<BouncerResource> = Api::namespaced(ctx.gateway.client(), &ctx.namespace);

    finalizer(&api, BOUNCER_FINALIZER, resource, |event| async {
        match event {
            Finalizer::Apply(resource) => apply(&resource, &ctx).await,
            Finalizer::Cleanup(resource) => {
                let removed = ctx.reconciler.on_bouncer_deleted(&resource.name_any()).await?;
                if let Some(bouncer) = removed {
                    ctx.publish_network_endpoints(&bouncer.net).await?;
                }
                Ok(Action::await_change())
            }
        }
    })
    .await
    .map_err(ReconcileError::from)
}

async fn apply(resource: &BouncerResource, ctx: &Context) -> Result<Action, CoreError> {
    let bouncer = match Bouncer::try_from(resource) {
        Ok(bouncer) => bouncer,
        Err(e) => {
            warn!("Ignoring Bouncer {}: {}", resource.name_any(), e);
            return Ok(Action::await_change());
        }
    };

    info!("Reconciling Bouncer {} in network {}", bouncer.name, bouncer.net);
    let bouncer = ctx.reconciler.on_bouncer_observed(bouncer).await?;
    ctx.gateway.publish_bouncer_status(&bouncer).await?;
    ctx.publish_network_endpoints(&bouncer.net).await?;

    // Membership also changes through endpoint events; refresh the status
    Ok(Action::requeue(Duration::from_secs(300)))
}

fn error_policy(
    resource: Arc<BouncerResource>,
    e: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    error!("Error reconciling Bouncer {}: {}", resource.name_any(), e);
    Action::requeue(Duration::from_secs(60))
}
