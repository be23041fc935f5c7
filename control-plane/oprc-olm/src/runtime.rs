use std::sync::Arc;

use futures_util::future::try_join_all;
use kube::{Api, Client};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::OlmConfig;
use crate::controller::runner;
use crate::controller::{
    OperatorConditionGenerator, OperatorConditionReconciler,
};
use crate::crd::operator::Operator;
use crate::crd::operator_condition::OperatorCondition;
use crate::registry::Registry;
use crate::store::KubeStore;

/// Spawn the controller that converges RBAC and env of OperatorConditions.
pub fn spawn_condition_controller(
    client: Client,
    store: Arc<KubeStore>,
    registry: &Registry,
    cfg: &OlmConfig,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let reconciler = OperatorConditionReconciler::new(store, registry)?;
    let api: Api<OperatorCondition> = match cfg.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let requeue_after = cfg.error_requeue();
    Ok(tokio::spawn(async move {
        runner::run("operatorcondition", api, reconciler, requeue_after).await
    }))
}

/// Spawn the controller that generates OperatorConditions for Operators.
pub fn spawn_generator_controller(
    client: Client,
    store: Arc<KubeStore>,
    registry: &Registry,
    cfg: &OlmConfig,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let reconciler = OperatorConditionGenerator::new(store, registry)?;
    let api: Api<Operator> = Api::all(client);
    let requeue_after = cfg.error_requeue();
    Ok(tokio::spawn(async move {
        runner::run("operatorcondition-generator", api, reconciler, requeue_after)
            .await
    }))
}

/// Start every enabled controller and wait until all of them finish.
pub async fn run_all(client: Client, cfg: OlmConfig) -> anyhow::Result<()> {
    let registry = Registry::defaults();
    let store = Arc::new(KubeStore::new(client.clone()));

    let mut tasks = Vec::new();
    if cfg.condition_enabled() {
        tasks.push(spawn_condition_controller(
            client.clone(),
            store.clone(),
            &registry,
            &cfg,
        )?);
    }
    if cfg.generator_enabled() {
        tasks.push(spawn_generator_controller(
            client.clone(),
            store.clone(),
            &registry,
            &cfg,
        )?);
    }
    info!(controllers = tasks.len(), "controllers started");

    for res in try_join_all(tasks).await? {
        res?;
    }
    Ok(())
}
