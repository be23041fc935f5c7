//! Kinds this process knows how to read and write.
//!
//! A [`Registry`] is built once in `main` and handed to each reconciler,
//! which checks at construction that every kind it touches is present.

use std::collections::BTreeSet;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{CustomResourceExt, Resource};

use crate::crd::cluster_service_version::ClusterServiceVersion;
use crate::crd::operator::Operator;
use crate::crd::operator_condition::OperatorCondition;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("kind {kind} ({api_version}) is not registered")]
    Unregistered { api_version: String, kind: String },
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    kinds: BTreeSet<(String, String)>,
    crds: Vec<CustomResourceDefinition>,
}

fn gvk<K: Resource<DynamicType = ()>>() -> (String, String) {
    (K::api_version(&()).into_owned(), K::kind(&()).into_owned())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Core kinds plus this crate's custom resources.
    pub fn defaults() -> Self {
        Self::new()
            .with::<ServiceAccount>()
            .with::<Deployment>()
            .with::<Role>()
            .with::<RoleBinding>()
            .with_crd::<OperatorCondition>()
            .with_crd::<Operator>()
            .with_crd::<ClusterServiceVersion>()
    }

    pub fn with<K: Resource<DynamicType = ()>>(mut self) -> Self {
        self.kinds.insert(gvk::<K>());
        self
    }

    /// Register a custom resource and keep its definition for `crdgen`.
    pub fn with_crd<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()> + CustomResourceExt,
    {
        if self.kinds.insert(gvk::<K>()) {
            self.crds.push(K::crd());
        }
        self
    }

    pub fn contains<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.kinds.contains(&gvk::<K>())
    }

    pub fn require<K: Resource<DynamicType = ()>>(
        &self,
    ) -> Result<(), RegistryError> {
        if self.contains::<K>() {
            return Ok(());
        }
        let (api_version, kind) = gvk::<K>();
        Err(RegistryError::Unregistered { api_version, kind })
    }

    pub fn crds(&self) -> &[CustomResourceDefinition] {
        &self.crds
    }
}
