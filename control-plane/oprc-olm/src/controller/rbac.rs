//! Role and RoleBinding that let an operator's service accounts read its
//! own OperatorCondition.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::api::ObjectMeta;
use tracing::{debug, instrument};

use crate::crd::GROUP;
use crate::crd::operator_condition::OperatorCondition;
use crate::ownership::{filter_owned, has_owner_reference};
use crate::store::{CreateOutcome, Store, StoreError, create_or_fetch};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

#[derive(thiserror::Error, Debug)]
pub enum RbacError {
    #[error("operatorcondition has no namespace")]
    MissingNamespace,
    #[error("listing serviceaccounts failed: {0}")]
    ListServiceAccounts(#[source] StoreError),
    #[error("ensuring role {name:?} failed: {source}")]
    Role {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("ensuring rolebinding {name:?} failed: {source}")]
    RoleBinding {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl RbacError {
    /// True when a concurrent writer got there first.
    pub fn is_conflict(&self) -> bool {
        match self {
            RbacError::Role { source, .. }
            | RbacError::RoleBinding { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

fn meta(name: &str, namespace: &str, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

fn rule(verbs: &[&str], resource: &str, condition: &str) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![GROUP.to_string()]),
        resources: Some(vec![resource.to_string()]),
        resource_names: Some(vec![condition.to_string()]),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

/// Role granting read access to the condition and write access to its
/// status, both limited to the one named condition.
pub fn desired_role(
    condition: &str,
    namespace: &str,
    owner: &OwnerReference,
) -> Role {
    Role {
        metadata: meta(condition, namespace, owner),
        rules: Some(vec![
            rule(&["get"], "operatorconditions", condition),
            rule(
                &["get", "update", "patch"],
                "operatorconditions/status",
                condition,
            ),
        ]),
    }
}

/// Binding of [`desired_role`] to every account in `accounts`, in order.
pub fn desired_role_binding(
    condition: &str,
    namespace: &str,
    owner: &OwnerReference,
    accounts: &[ServiceAccount],
) -> RoleBinding {
    let subjects = accounts
        .iter()
        .map(|sa| Subject {
            kind: "ServiceAccount".to_string(),
            name: sa.name_any(),
            namespace: Some(namespace.to_string()),
            api_group: Some(String::new()),
        })
        .collect();
    RoleBinding {
        metadata: meta(condition, namespace, owner),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: condition.to_string(),
        },
        subjects: Some(subjects),
    }
}

/// Converge the Role and RoleBinding of `condition`.
///
/// Each object is created, or fetched and overwritten when it already
/// exists. The first failure aborts the attempt.
#[instrument(skip_all, fields(condition = %condition.name_any()))]
pub async fn ensure_condition_rbac<S: Store>(
    store: &S,
    condition: &OperatorCondition,
    owner: &OwnerReference,
) -> Result<(), RbacError> {
    let name = condition.name_any();
    let namespace = condition.namespace().ok_or(RbacError::MissingNamespace)?;

    let accounts: Vec<ServiceAccount> = store
        .list(Some(&namespace), None)
        .await
        .map_err(RbacError::ListServiceAccounts)?;
    let owned = filter_owned(accounts, |sa| has_owner_reference(sa, owner));
    debug!(accounts = owned.len(), "owned serviceaccounts");

    let role = desired_role(&name, &namespace, owner);
    let role_err = |source: StoreError| RbacError::Role {
        name: name.clone(),
        source,
    };
    match create_or_fetch(store, &role).await {
        CreateOutcome::Created(_) => debug!("role created"),
        CreateOutcome::AlreadyExists(mut existing) => {
            existing.metadata.owner_references =
                role.metadata.owner_references.clone();
            existing.rules = role.rules.clone();
            store.update(&existing).await.map_err(role_err)?;
            debug!("role updated");
        }
        CreateOutcome::Fatal(e) => return Err(role_err(e)),
    }

    let binding = desired_role_binding(&name, &namespace, owner, &owned);
    let binding_err = |source: StoreError| RbacError::RoleBinding {
        name: name.clone(),
        source,
    };
    match create_or_fetch(store, &binding).await {
        CreateOutcome::Created(_) => debug!("rolebinding created"),
        CreateOutcome::AlreadyExists(mut existing) => {
            existing.metadata.owner_references =
                binding.metadata.owner_references.clone();
            existing.subjects = binding.subjects.clone();
            existing.role_ref = binding.role_ref.clone();
            store.update(&existing).await.map_err(binding_err)?;
            debug!("rolebinding updated");
        }
        CreateOutcome::Fatal(e) => return Err(binding_err(e)),
    }
    Ok(())
}
