use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::{DynamicObject, Selector};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use tracing::trace;

use super::{Object, Store, StoreError, kind_of};

/// [`Store`] backed by the Kubernetes API server.
///
/// Requests go through `Api<DynamicObject>` so namespaced and cluster-scoped
/// kinds share one code path; objects are converted with serde.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: Object>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = ApiResource::erase::<K>(&());
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

fn to_dynamic<K: Object>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn from_dynamic<K: Object>(obj: DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Map API status codes onto the store's error taxonomy.
fn classify(err: kube::Error, kind: &str, name: &str) -> StoreError {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp)
            if resp.code == 409 && resp.reason == "AlreadyExists" =>
        {
            StoreError::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            message: resp.message.clone(),
        },
        _ => StoreError::Kube(err),
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        trace!(%kind, ?namespace, %name, "kube store: get");
        let obj = self
            .api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, &kind, name))?;
        from_dynamic(obj)
    }

    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: Option<&Selector>,
    ) -> Result<Vec<K>, StoreError> {
        let kind = kind_of::<K>();
        trace!(%kind, ?namespace, ?selector, "kube store: list");
        let mut lp = ListParams::default();
        if let Some(sel) = selector.filter(|s| !s.selects_all()) {
            lp = lp.labels_from(sel);
        }
        let list = self
            .api::<K>(namespace)
            .list(&lp)
            .await
            .map_err(|e| classify(e, &kind, ""))?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let name = obj
            .meta()
            .name
            .clone()
            .or_else(|| obj.meta().generate_name.clone())
            .unwrap_or_default();
        trace!(%kind, %name, "kube store: create");
        let created = self
            .api::<K>(obj.namespace().as_deref())
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| classify(e, &kind, &name))?;
        from_dynamic(created)
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let name = obj.meta().name.clone().ok_or_else(|| {
            StoreError::Invalid(format!("{kind} update without a name"))
        })?;
        trace!(%kind, %name, "kube store: update");
        let updated = self
            .api::<K>(obj.namespace().as_deref())
            .replace(&name, &PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| classify(e, &kind, &name))?;
        from_dynamic(updated)
    }

    async fn delete<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        params: &DeleteParams,
    ) -> Result<(), StoreError> {
        let kind = kind_of::<K>();
        trace!(%kind, ?namespace, %name, "kube store: delete");
        self.api::<K>(namespace)
            .delete(name, params)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &kind, name))
    }
}
