//! Glue between [`Reconciler`]s and `kube::runtime::Controller`.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::Resource;
use kube::api::Api;
use kube::runtime::{Controller, controller::Action, watcher::Config};
use serde::de::DeserializeOwned;
use tracing::{error, info};

use super::{ReconcileErr, Reconciler};
use crate::store::ObjectKey;

/// A reconcile that returned an error, with the retry decision attached.
#[derive(thiserror::Error, Debug)]
#[error("{source}")]
pub struct ReconcileFailure {
    pub requeue: bool,
    #[source]
    pub source: ReconcileErr,
}

pub struct RunnerContext<R> {
    pub reconciler: R,
    pub requeue_after: Duration,
}

/// Translate a [`ReconcileResult`](super::ReconcileResult) into a
/// controller action.
pub async fn reconcile<K, R>(
    obj: Arc<K>,
    ctx: Arc<RunnerContext<R>>,
) -> Result<Action, ReconcileFailure>
where
    K: Resource,
    R: Reconciler,
{
    let key = ObjectKey::of(obj.as_ref());
    let result = ctx.reconciler.reconcile(&key).await;
    match (result.error, result.requeue) {
        (Some(source), requeue) => Err(ReconcileFailure { requeue, source }),
        (None, true) => Ok(Action::requeue(ctx.requeue_after)),
        (None, false) => Ok(Action::await_change()),
    }
}

/// Store failures are retried after `requeue_after` whether or not the
/// reconciler asked for it; terminal preconditions wait for the object to
/// change.
pub fn error_policy<K, R>(
    _obj: Arc<K>,
    err: &ReconcileFailure,
    ctx: Arc<RunnerContext<R>>,
) -> Action {
    let terminal = err.source.is_terminal();
    error!(
        error = %err.source,
        requeue = err.requeue,
        terminal,
        "reconcile failed"
    );
    if err.requeue || !terminal {
        Action::requeue(ctx.requeue_after)
    } else {
        Action::await_change()
    }
}

/// Drive `reconciler` from a watch on `api` until the stream ends or the
/// process receives a shutdown signal.
pub async fn run<K, R>(
    name: &'static str,
    api: Api<K>,
    reconciler: R,
    requeue_after: Duration,
) -> anyhow::Result<()>
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    R: Reconciler + 'static,
{
    let ctx = Arc::new(RunnerContext {
        reconciler,
        requeue_after,
    });
    info!(controller = name, "starting controller");

    Controller::new(api, Config::default())
        .shutdown_on_signal()
        .run(reconcile::<K, R>, error_policy::<K, R>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(controller = name, object = %obj_ref, ?action, "reconciled");
                }
                Err(e) => {
                    error!(controller = name, error = ?e, "reconcile error");
                }
            }
        })
        .await;

    info!(controller = name, "controller stopped");
    Ok(())
}
