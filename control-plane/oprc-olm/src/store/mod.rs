//! Object store seam.
//!
//! Everything the reconcilers know about the cluster goes through [`Store`].
//! The store offers create-fails-if-present and update-fails-if-stale; it
//! has no transactions and the core never locks it.

mod cluster;
#[cfg(any(test, feature = "test-util"))]
mod memory;

use std::fmt;

use async_trait::async_trait;
use kube::api::DeleteParams;
use kube::core::Selector;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use cluster::KubeStore;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{DeleteRecord, Fault, MemoryStore, Verb};

/// Objects the store can hold: any statically typed kube resource.
pub trait Object:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> Object for T where
    T: Resource<DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// `(namespace, name)` of a triggered object. Cluster-scoped objects carry
/// no namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("{kind} {name:?} was modified concurrently: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("kube api error: {0}")]
    Kube(#[source] kube::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<K, StoreError>;

    /// List objects, optionally restricted to a namespace and a label
    /// selector.
    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: Option<&Selector>,
    ) -> Result<Vec<K>, StoreError>;

    /// Create `obj` in its own namespace. Fails with
    /// [`StoreError::AlreadyExists`] when the name is taken.
    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace `obj`. Fails with [`StoreError::Conflict`] when the stored
    /// resourceVersion differs from the one carried by `obj`.
    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    async fn delete<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        params: &DeleteParams,
    ) -> Result<(), StoreError>;
}

/// Result of a create attempt that tolerates losing the creation race.
#[derive(Debug)]
pub enum CreateOutcome<K> {
    Created(K),
    /// The name was taken; carries the object currently stored.
    AlreadyExists(K),
    Fatal(StoreError),
}

/// Create `desired`; on `AlreadyExists` fetch the stored object instead.
pub async fn create_or_fetch<S, K>(store: &S, desired: &K) -> CreateOutcome<K>
where
    S: Store,
    K: Object,
{
    match store.create(desired).await {
        Ok(created) => CreateOutcome::Created(created),
        Err(e) if e.is_already_exists() => {
            let ns = desired.meta().namespace.as_deref();
            match store.get::<K>(ns, &desired.name_any()).await {
                Ok(existing) => CreateOutcome::AlreadyExists(existing),
                Err(e) => CreateOutcome::Fatal(e),
            }
        }
        Err(e) => CreateOutcome::Fatal(e),
    }
}

pub(crate) fn kind_of<K: Object>() -> String {
    K::kind(&()).into_owned()
}
