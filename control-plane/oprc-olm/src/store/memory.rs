use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::{DeleteParams, PropagationPolicy};
use kube::core::{Selector, SelectorExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::trace;

use super::{Object, ObjectKey, Store, StoreError, kind_of};

/// Store operations, used to count calls and to target injected faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// Failure returned by the next matching call instead of running it.
#[derive(Clone, Debug)]
pub enum Fault {
    NotFound,
    AlreadyExists,
    Conflict,
    Unavailable(String),
}

impl Fault {
    fn into_error(self, kind: &str, name: &str) -> StoreError {
        let (kind, name) = (kind.to_string(), name.to_string());
        match self {
            Fault::NotFound => StoreError::NotFound { kind, name },
            Fault::AlreadyExists => StoreError::AlreadyExists { kind, name },
            Fault::Conflict => StoreError::Conflict {
                kind,
                name,
                message: "injected conflict".into(),
            },
            Fault::Unavailable(msg) => StoreError::Unavailable(msg),
        }
    }
}

/// A delete request as it reached the store.
#[derive(Clone, Debug)]
pub struct DeleteRecord {
    pub kind: String,
    pub key: ObjectKey,
    pub propagation_policy: Option<PropagationPolicy>,
    pub grace_period_seconds: Option<u32>,
}

type Slot = (String, Option<String>, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Slot, Value>,
    calls: HashMap<(Verb, String), usize>,
    faults: HashMap<(Verb, String), VecDeque<Fault>>,
    deletes: Vec<DeleteRecord>,
    next_uid: u64,
    next_version: u64,
}

impl State {
    /// Count the call and hand back a pending fault, if any.
    fn enter(&mut self, verb: Verb, kind: &str) -> Option<Fault> {
        let key = (verb, kind.to_string());
        *self.calls.entry(key.clone()).or_default() += 1;
        self.faults.get_mut(&key).and_then(VecDeque::pop_front)
    }

    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn uids_owned_by(&self, uid: &str) -> Vec<Slot> {
        self.objects
            .iter()
            .filter(|(_, v)| {
                v["metadata"]["ownerReferences"]
                    .as_array()
                    .is_some_and(|refs| refs.iter().any(|r| r["uid"] == uid))
            })
            .map(|(slot, _)| slot.clone())
            .collect()
    }
}

/// In-process [`Store`] with API-server-like semantics: uid and
/// resourceVersion assignment, `generateName`, optimistic concurrency, label
/// selectors and owner-reference cascading on delete.
///
/// Call counters and fault injection make it usable as a test double.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `verb` calls made for kind `K`.
    pub async fn calls<K: Object>(&self, verb: Verb) -> usize {
        let state = self.state.lock().await;
        state
            .calls
            .get(&(verb, kind_of::<K>()))
            .copied()
            .unwrap_or(0)
    }

    pub async fn reset_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Make the next `verb` call for kind `K` fail with `fault`. Faults
    /// queue up in order.
    pub async fn fail_next<K: Object>(&self, verb: Verb, fault: Fault) {
        self.state
            .lock()
            .await
            .faults
            .entry((verb, kind_of::<K>()))
            .or_default()
            .push_back(fault);
    }

    pub async fn deletes(&self) -> Vec<DeleteRecord> {
        self.state.lock().await.deletes.clone()
    }

    /// Every stored object of kind `K`, across namespaces.
    pub async fn all<K: Object>(&self) -> Vec<K> {
        let kind = kind_of::<K>();
        let state = self.state.lock().await;
        state
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }
}

fn slot<K: Object>(namespace: Option<&str>, name: &str) -> Slot {
    (kind_of::<K>(), namespace.map(str::to_string), name.to_string())
}

fn decode<K: Object>(value: &Value) -> Result<K, StoreError> {
    Ok(serde_json::from_value(value.clone())?)
}

fn labels_of(value: &Value) -> BTreeMap<String, String> {
    serde_json::from_value(value["metadata"]["labels"].clone())
        .unwrap_or_default()
}

fn generated_suffix() -> String {
    const ALPHABET: [char; 36] = [
        'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n',
        'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1',
        '2', '3', '4', '5', '6', '7', '8', '9',
    ];
    nanoid::nanoid!(5, &ALPHABET)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.state.lock().await;
        if let Some(fault) = state.enter(Verb::Get, &kind) {
            return Err(fault.into_error(&kind, name));
        }
        match state.objects.get(&slot::<K>(namespace, name)) {
            Some(v) => decode(v),
            None => Err(StoreError::NotFound {
                kind,
                name: name.to_string(),
            }),
        }
    }

    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: Option<&Selector>,
    ) -> Result<Vec<K>, StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.state.lock().await;
        if let Some(fault) = state.enter(Verb::List, &kind) {
            return Err(fault.into_error(&kind, ""));
        }
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind
                    && namespace.is_none_or(|want| ns.as_deref() == Some(want))
            })
            .filter(|(_, v)| {
                selector.is_none_or(|sel| sel.matches(&labels_of(v)))
            })
            .map(|(_, v)| decode(v))
            .collect()
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let mut obj = obj.clone();
        let mut state = self.state.lock().await;
        let requested = obj.meta().name.clone().unwrap_or_default();
        if let Some(fault) = state.enter(Verb::Create, &kind) {
            return Err(fault.into_error(&kind, &requested));
        }

        let name = match (obj.meta().name.clone(), &obj.meta().generate_name) {
            (Some(name), _) if !name.is_empty() => name,
            (_, Some(prefix)) if !prefix.is_empty() => {
                format!("{prefix}{}", generated_suffix())
            }
            _ => {
                return Err(StoreError::Invalid(format!(
                    "{kind} has neither name nor generateName"
                )));
            }
        };
        let key = slot::<K>(obj.namespace().as_deref(), &name);
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind, name });
        }

        state.next_uid += 1;
        let uid = format!("uid-{}", state.next_uid);
        let version = state.bump_version();
        let meta = obj.meta_mut();
        meta.name = Some(name.clone());
        meta.uid = Some(uid);
        meta.resource_version = Some(version);

        trace!(%kind, %name, "memory store: created");
        state.objects.insert(key, serde_json::to_value(&obj)?);
        Ok(obj)
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let name = obj.meta().name.clone().ok_or_else(|| {
            StoreError::Invalid(format!("{kind} update without a name"))
        })?;
        let mut state = self.state.lock().await;
        if let Some(fault) = state.enter(Verb::Update, &kind) {
            return Err(fault.into_error(&kind, &name));
        }

        let key = slot::<K>(obj.namespace().as_deref(), &name);
        let Some(stored) = state.objects.get(&key) else {
            return Err(StoreError::NotFound { kind, name });
        };
        let stored_meta = &stored["metadata"];
        let stored_version = stored_meta["resourceVersion"].as_str();
        if let Some(incoming) = obj.meta().resource_version.as_deref() {
            if Some(incoming) != stored_version {
                return Err(StoreError::Conflict {
                    kind,
                    name,
                    message: format!(
                        "resourceVersion {incoming} is stale (stored {})",
                        stored_version.unwrap_or_default()
                    ),
                });
            }
        }
        let uid = stored_meta["uid"].as_str().map(str::to_string);

        let mut obj = obj.clone();
        let version = state.bump_version();
        let meta = obj.meta_mut();
        meta.uid = uid;
        meta.resource_version = Some(version);

        trace!(%kind, %name, "memory store: updated");
        state.objects.insert(key, serde_json::to_value(&obj)?);
        Ok(obj)
    }

    async fn delete<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        params: &DeleteParams,
    ) -> Result<(), StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.state.lock().await;
        if let Some(fault) = state.enter(Verb::Delete, &kind) {
            return Err(fault.into_error(&kind, name));
        }
        state.deletes.push(DeleteRecord {
            kind: kind.clone(),
            key: ObjectKey {
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            },
            propagation_policy: params.propagation_policy.clone(),
            grace_period_seconds: params.grace_period_seconds,
        });

        let Some(removed) = state.objects.remove(&slot::<K>(namespace, name))
        else {
            return Err(StoreError::NotFound {
                kind,
                name: name.to_string(),
            });
        };
        trace!(%kind, %name, "memory store: deleted");

        if matches!(params.propagation_policy, Some(PropagationPolicy::Orphan))
        {
            return Ok(());
        }
        let mut pending: Vec<String> = removed["metadata"]["uid"]
            .as_str()
            .map(str::to_string)
            .into_iter()
            .collect();
        while let Some(uid) = pending.pop() {
            for dependent in state.uids_owned_by(&uid) {
                if let Some(v) = state.objects.remove(&dependent) {
                    if let Some(child) = v["metadata"]["uid"].as_str() {
                        pending.push(child.to_string());
                    }
                }
            }
        }
        Ok(())
    }
}
