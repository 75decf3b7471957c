use anyhow::Result;
use kube::Client;
use netmesh_core::{Reconciler, Store};
use netmesh_kube::KubeGateway;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod bouncer_controller;
mod config;
mod context;
mod endpoint_controller;
mod service_watcher;

use bouncer_controller::BouncerController;
use config::OperatorConfig;
use context::Context;
use endpoint_controller::EndpointController;
use service_watcher::{BackendWatcher, ServiceWatcher};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::from_env()?;
    init_tracing(config.json_logs);

    info!("Starting netmesh-operator in namespace {}...", config.namespace);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let client = Client::try_default().await?;

    let gateway = Arc::new(KubeGateway::new(
        client.clone(),
        config.namespace.clone(),
        config.reconciler.retry.clone(),
        shutdown_rx.clone(),
    ));
    let store = Arc::new(Store::new());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        gateway.clone(),
        config.reconciler.clone(),
    ));

    // Re-sync endpoints provisioned before this process started
    let existing = gateway.list_endpoints().await?;
    let loaded = reconciler.bootstrap(existing).await?;
    info!("Bootstrapped {} provisioned endpoints", loaded);

    let context = Arc::new(Context {
        reconciler,
        gateway,
        namespace: config.namespace.clone(),
    });

    let tasks = vec![
        tokio::spawn(
            BouncerController::new(client.clone(), context.clone()).run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            EndpointController::new(client.clone(), context.clone()).run(shutdown_rx.clone()),
        ),
        tokio::spawn(ServiceWatcher::new(client.clone(), context.clone()).run(shutdown_rx.clone())),
        tokio::spawn(BackendWatcher::new(client, context).run(shutdown_rx)),
    ];

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping controllers...");
    shutdown_tx.send_replace(true);

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Controller error: {}", e),
            Err(e) => error!("Controller task failed: {}", e),
        }
    }

    info!(
        "Stopped with {} endpoints and {} bouncers in store",
        store.endpoint_count().await,
        store.bouncer_count().await
    );
    Ok(())
}
