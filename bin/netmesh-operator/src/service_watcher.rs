//! Watches built-in Services and Endpoints for scaled endpoints

use crate::context::{shutdown_signal, Context};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::{Api, Client, ResourceExt};
use kube_runtime::watcher::Event;
use kube_runtime::{watcher, WatchStreamExt};
use netmesh_kube::{backend_groups, is_managed};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Synthesizes an endpoint for every service with a cluster IP
pub struct ServiceWatcher {
    client: Client,
    context: Arc<Context>,
}

impl ServiceWatcher {
    pub fn new(client: Client, context: Arc<Context>) -> Self {
        Self { client, context }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting Service watch");

        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.context.namespace);
        let mut stream = watcher(services, watcher::Config::default())
            .default_backoff()
            .take_until(shutdown_signal(shutdown))
            .boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(svc)) | Ok(Event::InitApply(svc)) => self.on_apply(&svc).await,
                Ok(Event::Delete(svc)) => {
                    let name = svc.name_any();
                    if let Err(e) = self.context.reconciler.on_scaled_service_deleted(&name).await
                    {
                        error!("Failed to delete scaled endpoint {}: {}", name, e);
                    }
                }
                Ok(Event::Init) | Ok(Event::InitDone) => {}
                Err(e) => error!("Service watch error: {}", e),
            }
        }

        info!("Service watch stopped");
        Ok(())
    }

    async fn on_apply(&self, svc: &Service) {
        let name = svc.name_any();
        let namespace = svc
            .namespace()
            .unwrap_or_else(|| self.context.namespace.clone());
        let cluster_ip = svc.spec.as_ref().and_then(|spec| spec.cluster_ip.as_deref());

        if let Err(e) = self
            .context
            .reconciler
            .on_scaled_service_observed(&name, &namespace, cluster_ip)
            .await
        {
            error!("Failed to create scaled endpoint {}: {}", name, e);
        }
    }
}

/// Feeds the addresses of managed built-in Endpoints objects into the
/// backends of their scaled endpoint
pub struct BackendWatcher {
    client: Client,
    context: Arc<Context>,
}

impl BackendWatcher {
    pub fn new(client: Client, context: Arc<Context>) -> Self {
        Self { client, context }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting Endpoints watch");

        let endpoints: Api<Endpoints> =
            Api::namespaced(self.client.clone(), &self.context.namespace);
        let mut stream = watcher(endpoints, watcher::Config::default())
            .default_backoff()
            .take_until(shutdown_signal(shutdown))
            .boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(obj)) | Ok(Event::InitApply(obj)) => self.on_apply(&obj).await,
                Ok(_) => {}
                Err(e) => error!("Endpoints watch error: {}", e),
            }
        }

        info!("Endpoints watch stopped");
        Ok(())
    }

    async fn on_apply(&self, obj: &Endpoints) {
        let config = self.context.reconciler.config();
        if !is_managed(obj, &config.annotation_key, &config.annotation_value) {
            return;
        }

        let name = obj.name_any();
        let groups = backend_groups(obj);
        match self
            .context
            .reconciler
            .on_backend_groups_updated(&name, &groups)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!("Endpoints {} has no scaled endpoint yet", name),
            Err(e) => error!("Failed to update backends of {}: {}", name, e),
        }
    }
}
