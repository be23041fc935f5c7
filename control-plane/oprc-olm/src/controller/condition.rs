use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, instrument};

use super::rbac::ensure_condition_rbac;
use super::{ReconcileErr, ReconcileResult, Reconciler};
use crate::crd::cluster_service_version::ClusterServiceVersion;
use crate::crd::operator_condition::OperatorCondition;
use crate::envvar::{OPERATOR_CONDITION_ENV_VAR, inject_into_container, plain};
use crate::ownership::{filter_owned, get_owner_by_kind, has_owner_reference};
use crate::registry::{Registry, RegistryError};
use crate::store::{ObjectKey, Store};

/// Keeps the RBAC and deployment env of one OperatorCondition converged.
pub struct OperatorConditionReconciler<S> {
    store: Arc<S>,
}

impl<S: Store> OperatorConditionReconciler<S> {
    pub fn new(
        store: Arc<S>,
        registry: &Registry,
    ) -> Result<Self, RegistryError> {
        registry.require::<OperatorCondition>()?;
        registry.require::<ServiceAccount>()?;
        registry.require::<Role>()?;
        registry.require::<RoleBinding>()?;
        registry.require::<Deployment>()?;
        Ok(Self { store })
    }

    /// Inject `OPERATOR_CONDITION_NAME` into every container of the
    /// deployments owned by `owner`. Returns how many deployments changed.
    async fn ensure_deployment_env_vars(
        &self,
        condition: &OperatorCondition,
        owner: &OwnerReference,
    ) -> Result<usize, ReconcileErr> {
        let namespace = condition.namespace();
        let deployments: Vec<Deployment> = self
            .store
            .list(namespace.as_deref(), None)
            .await
            .map_err(|source| ReconcileErr::List {
                kind: "Deployment",
                source,
            })?;

        let env_var = plain(OPERATOR_CONDITION_ENV_VAR, &condition.name_any());
        let mut changed = 0;
        for mut deployment in
            filter_owned(deployments, |d| has_owner_reference(d, owner))
        {
            let containers = deployment
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut())
                .map(|p| p.containers.iter_mut());
            let mut dirty = false;
            for container in containers.into_iter().flatten() {
                dirty |= inject_into_container(container, &env_var);
            }
            if !dirty {
                continue;
            }
            self.store.update(&deployment).await.map_err(|source| {
                ReconcileErr::EnvInjection {
                    deployment: deployment.name_any(),
                    source,
                }
            })?;
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl<S: Store> Reconciler for OperatorConditionReconciler<S> {
    #[instrument(skip_all, fields(key = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult {
        debug!("reconciling operatorcondition");
        let condition: OperatorCondition =
            match self.store.get(key.namespace(), &key.name).await {
                Ok(condition) => condition,
                Err(e) if e.is_not_found() => {
                    debug!("operatorcondition is gone");
                    return ReconcileResult::done();
                }
                Err(source) => {
                    return ReconcileResult::fail(ReconcileErr::Load {
                        key: key.clone(),
                        source,
                    });
                }
            };

        let csv_kind = ClusterServiceVersion::kind(&());
        let Some(owner) = get_owner_by_kind(&condition, &csv_kind) else {
            return ReconcileResult::fail(ReconcileErr::MissingOwner(
                key.clone(),
            ));
        };

        if let Err(e) =
            ensure_condition_rbac(self.store.as_ref(), &condition, &owner).await
        {
            debug!(error = %e, "rbac not converged");
            return ReconcileResult::retry(e);
        }

        match self.ensure_deployment_env_vars(&condition, &owner).await {
            Ok(changed) => {
                debug!(changed, "deployment env converged");
                ReconcileResult::done()
            }
            Err(e) => ReconcileResult::retry(e),
        }
    }
}
