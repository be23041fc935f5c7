//! Namespace-scoped operations used while installing an operator's
//! workloads: RBAC objects, service accounts and deployments.

pub mod status;

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::DeleteParams;
use kube::core::Selector;
use kube::{Resource, ResourceExt};
use tracing::{debug, instrument};

use crate::ownership::{add_non_blocking_owner, is_owned_by};
use crate::store::{Store, StoreError};
pub use status::{RolloutError, RolloutStatus, deployment_status};

#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error("bad object supplied: {0}")]
    InvalidObject(String),
    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rollout(#[from] RolloutError),
}

impl InstallError {
    pub fn is_not_found(&self) -> bool {
        match self {
            InstallError::Store(e) | InstallError::Context { source: e, .. } => {
                e.is_not_found()
            }
            _ => false,
        }
    }
}

fn context(context: &'static str) -> impl FnOnce(StoreError) -> InstallError {
    move |source| InstallError::Context { context, source }
}

/// Install operations bound to one namespace.
pub struct InstallClient<S> {
    store: Arc<S>,
    namespace: String,
}

impl<S> Clone for InstallClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<S: Store> InstallClient<S> {
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn scoped<K: Resource>(&self, obj: &K) -> K
    where
        K: Clone,
    {
        let mut obj = obj.clone();
        obj.meta_mut().namespace = Some(self.namespace.clone());
        obj
    }

    pub async fn create_role(&self, role: &Role) -> Result<Role, InstallError> {
        Ok(self.store.create(&self.scoped(role)).await?)
    }

    pub async fn create_role_binding(
        &self,
        binding: &RoleBinding,
    ) -> Result<RoleBinding, InstallError> {
        Ok(self.store.create(&self.scoped(binding)).await?)
    }

    pub async fn create_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Deployment, InstallError> {
        Ok(self.store.create(&self.scoped(deployment)).await?)
    }

    /// Create `deployment`, or replace the stored one wholesale when it
    /// already exists. The namespace defaults to the client's.
    #[instrument(skip_all, fields(deployment = %deployment.name_any()))]
    pub async fn create_or_update_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Deployment, InstallError> {
        let mut desired = deployment.clone();
        let ns = desired
            .namespace()
            .unwrap_or_else(|| self.namespace.clone());
        desired.metadata.namespace = Some(ns.clone());

        match self
            .store
            .get::<Deployment>(Some(&ns), &desired.name_any())
            .await
        {
            Ok(_) => {
                debug!("deployment exists, updating");
                Ok(self.store.update(&desired).await?)
            }
            Err(e) if e.is_not_found() => {
                debug!("deployment not found, creating");
                Ok(self.store.create(&desired).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<bool, InstallError> {
        let deployment: Deployment =
            self.store.get(Some(namespace), name).await?;
        Ok(deployment_status(&deployment)?.ready)
    }

    /// Cascading delete: dependents go first, no grace period.
    pub async fn delete_deployment(&self, name: &str) -> Result<(), InstallError> {
        let params = DeleteParams::foreground().grace_period(0);
        self.store
            .delete::<Deployment>(Some(&self.namespace), name, &params)
            .await?;
        Ok(())
    }

    pub async fn get_service_account_by_name(
        &self,
        name: &str,
    ) -> Result<ServiceAccount, InstallError> {
        Ok(self.store.get(Some(&self.namespace), name).await?)
    }

    /// Fetch each named deployment, skipping the ones that do not exist.
    pub async fn find_any_deployments_matching_names<N: AsRef<str>>(
        &self,
        names: &[N],
    ) -> Result<Vec<Deployment>, InstallError> {
        let mut found = Vec::with_capacity(names.len());
        for name in names {
            match self
                .store
                .get::<Deployment>(Some(&self.namespace), name.as_ref())
                .await
            {
                Ok(dep) => found.push(dep),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(found)
    }

    pub async fn find_any_deployments_matching_labels(
        &self,
        selector: &Selector,
    ) -> Result<Vec<Deployment>, InstallError> {
        Ok(self
            .store
            .list(Some(&self.namespace), Some(selector))
            .await?)
    }

    /// Make sure `service_account` exists in the client's namespace and is
    /// owned by `owner`.
    ///
    /// A freshly created account is returned as created, without an owner.
    /// An existing account that lacks the owner reference gains a
    /// non-blocking one.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn ensure_service_account<O>(
        &self,
        service_account: &ServiceAccount,
        owner: &O,
    ) -> Result<ServiceAccount, InstallError>
    where
        O: Resource<DynamicType = ()>,
    {
        let Some(name) = service_account
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
        else {
            return Err(InstallError::InvalidObject(
                "serviceaccount without a name".into(),
            ));
        };

        let found = match self
            .store
            .get::<ServiceAccount>(Some(&self.namespace), name)
            .await
        {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                let desired = self.scoped(service_account);
                return match self.store.create(&desired).await {
                    Ok(created) => Ok(created),
                    Err(e) if e.is_already_exists() => {
                        debug!(%name, "serviceaccount created concurrently");
                        Ok(desired)
                    }
                    Err(e) => Err(context("creating serviceaccount failed")(e)),
                };
            }
            Err(e) => {
                return Err(context(
                    "checking for existing serviceaccount failed",
                )(e));
            }
        };

        if is_owned_by(&found, owner) {
            return Ok(found);
        }
        let mut found = found;
        if !add_non_blocking_owner(&mut found, owner) {
            return Err(InstallError::InvalidObject(
                "owner has no name or uid".into(),
            ));
        }
        Ok(self.store.update(&found).await?)
    }
}
