pub mod condition;
pub mod decorator;
pub mod generator;
pub mod rbac;
pub mod runner;

use async_trait::async_trait;

pub use condition::OperatorConditionReconciler;
pub use decorator::{DecoratorError, OperatorDecorator};
pub use generator::OperatorConditionGenerator;
pub use rbac::{RbacError, ensure_condition_rbac};

use crate::store::{ObjectKey, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("loading {key} failed: {source}")]
    Load {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
    #[error("no ClusterServiceVersion owner specified on {0}")]
    MissingOwner(ObjectKey),
    #[error(transparent)]
    Rbac(#[from] RbacError),
    #[error("injecting env into deployment {deployment:?} failed: {source}")]
    EnvInjection {
        deployment: String,
        #[source]
        source: StoreError,
    },
    #[error("listing {kind} failed: {source}")]
    List {
        kind: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("component label key unavailable: {0}")]
    ComponentLabel(#[source] DecoratorError),
    #[error("creating OperatorCondition for {csv:?} failed: {source}")]
    Generate {
        csv: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcileErr {
    /// Preconditions that only a change to the watched object can satisfy.
    /// Every other error came from the store and may clear on retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconcileErr::MissingOwner(_) | ReconcileErr::ComponentLabel(_)
        )
    }
}

/// Outcome of one reconcile. The scheduler retries when `requeue` is set.
/// An error without `requeue` is retried too unless it
/// [is terminal](ReconcileErr::is_terminal).
#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub requeue: bool,
    pub error: Option<ReconcileErr>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue() -> Self {
        Self {
            requeue: true,
            error: None,
        }
    }

    pub fn retry(error: impl Into<ReconcileErr>) -> Self {
        Self {
            requeue: true,
            error: Some(error.into()),
        }
    }

    pub fn fail(error: impl Into<ReconcileErr>) -> Self {
        Self {
            requeue: false,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Entry point the scheduler drives with object keys.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult;
}
