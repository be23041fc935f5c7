//! Owner-reference helpers.
//!
//! Ownership is the back-reference an object carries in
//! `metadata.ownerReferences`; cascading deletion is left to the cluster
//! garbage collector.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// True when `object` carries an owner reference equal to `owner` on name,
/// kind and uid. Objects without owner references never match.
pub fn has_owner_reference<K: Resource>(
    object: &K,
    owner: &OwnerReference,
) -> bool {
    object
        .meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| {
            r.name == owner.name && r.kind == owner.kind && r.uid == owner.uid
        })
}

/// Keep the objects accepted by `predicate`, preserving their order.
pub fn filter_owned<K, F>(objects: Vec<K>, predicate: F) -> Vec<K>
where
    F: Fn(&K) -> bool,
{
    objects.into_iter().filter(|o| predicate(o)).collect()
}

/// First owner reference of the given kind.
pub fn get_owner_by_kind<K: Resource>(
    object: &K,
    kind: &str,
) -> Option<OwnerReference> {
    object
        .meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.kind == kind)
        .cloned()
}

/// True when any owner reference of `object` points at `owner`'s uid.
pub fn is_owned_by<K, O>(object: &K, owner: &O) -> bool
where
    K: Resource,
    O: Resource,
{
    let Some(uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    object
        .meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.uid == uid)
}

/// Owner reference that neither marks `owner` as controller nor blocks its
/// deletion. `None` when the owner has not been persisted yet.
pub fn non_blocking_owner<O>(owner: &O) -> Option<OwnerReference>
where
    O: Resource<DynamicType = ()>,
{
    let meta = owner.meta();
    Some(OwnerReference {
        api_version: O::api_version(&()).into_owned(),
        kind: O::kind(&()).into_owned(),
        name: meta.name.clone()?,
        uid: meta.uid.clone()?,
        controller: Some(false),
        block_owner_deletion: Some(false),
    })
}

/// Append a non-blocking reference to `owner`. A reference with the same
/// uid is replaced in place; every other reference is kept.
///
/// Returns false when `owner` has no name or uid.
pub fn add_non_blocking_owner<K, O>(object: &mut K, owner: &O) -> bool
where
    K: Resource,
    O: Resource<DynamicType = ()>,
{
    let Some(reference) = non_blocking_owner(owner) else {
        return false;
    };
    let refs = object
        .meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == reference.uid) {
        Some(existing) => *existing = reference,
        None => refs.push(reference),
    }
    true
}
