use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{DeleteParams, ObjectMeta};
use oprc_olm::controller::{
    OperatorConditionReconciler, ReconcileErr, Reconciler,
};
use oprc_olm::envvar::{OPERATOR_CONDITION_ENV_VAR, plain};
use oprc_olm::registry::Registry;
use oprc_olm::store::{Fault, MemoryStore, ObjectKey, Store, Verb};

mod common;
use common::*;

fn reconciler(
    store: &std::sync::Arc<MemoryStore>,
) -> OperatorConditionReconciler<MemoryStore> {
    OperatorConditionReconciler::new(store.clone(), &Registry::defaults())
        .expect("registry has every kind")
}

async fn subjects(store: &MemoryStore, name: &str) -> Vec<String> {
    let binding: RoleBinding = store.get(Some(NS), name).await.unwrap();
    binding
        .subjects
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

#[test_log::test(tokio::test)]
async fn rbac_is_created_then_converges_without_change() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let owner = owner_of(&csv);
    create_service_account(&store, "etcd-operator", vec![owner.clone()]).await;
    create_service_account(&store, "etcd-helper", vec![owner.clone()]).await;
    create_service_account(&store, "default", vec![]).await;
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner.clone()]).await;

    let r = reconciler(&store);
    let key = ObjectKey::namespaced(NS, &condition);
    let first = r.reconcile(&key).await;
    assert!(first.is_ok(), "{:?}", first.error);
    assert!(!first.requeue);

    let role_v1: Role = store.get(Some(NS), &condition).await.unwrap();
    let binding_v1: RoleBinding = store.get(Some(NS), &condition).await.unwrap();
    assert_eq!(
        subjects(&store, &condition).await,
        vec!["etcd-helper", "etcd-operator"]
    );
    assert_eq!(binding_v1.role_ref.name, condition);
    assert_eq!(role_v1.metadata.owner_references, Some(vec![owner.clone()]));

    let second = r.reconcile(&key).await;
    assert!(second.is_ok(), "{:?}", second.error);
    let role_v2: Role = store.get(Some(NS), &condition).await.unwrap();
    let binding_v2: RoleBinding = store.get(Some(NS), &condition).await.unwrap();
    assert_eq!(role_v1.rules, role_v2.rules);
    assert_eq!(
        role_v1.metadata.owner_references,
        role_v2.metadata.owner_references
    );
    assert_eq!(binding_v1.subjects, binding_v2.subjects);
    assert_eq!(binding_v1.role_ref, binding_v2.role_ref);

    // the second pass takes the update path
    assert_eq!(store.calls::<Role>(Verb::Create).await, 2);
    assert_eq!(store.calls::<Role>(Verb::Update).await, 1);
    assert_eq!(store.calls::<RoleBinding>(Verb::Update).await, 1);
}

#[test_log::test(tokio::test)]
async fn binding_drops_removed_service_accounts() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let owner = owner_of(&csv);
    for name in ["sa-a", "sa-b", "sa-c"] {
        create_service_account(&store, name, vec![owner.clone()]).await;
    }
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner]).await;
    let r = reconciler(&store);
    let key = ObjectKey::namespaced(NS, &condition);

    assert!(r.reconcile(&key).await.is_ok());
    assert_eq!(
        subjects(&store, &condition).await,
        vec!["sa-a", "sa-b", "sa-c"]
    );

    store
        .delete::<ServiceAccount>(Some(NS), "sa-b", &DeleteParams::default())
        .await
        .unwrap();
    assert!(r.reconcile(&key).await.is_ok());
    assert_eq!(subjects(&store, &condition).await, vec!["sa-a", "sa-c"]);
}

#[test_log::test(tokio::test)]
async fn binding_ignores_accounts_in_other_namespaces() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let owner = owner_of(&csv);
    create_service_account(&store, "etcd-operator", vec![owner.clone()]).await;
    store
        .create(&ServiceAccount {
            metadata: ObjectMeta {
                name: Some("etcd-remote".into()),
                namespace: Some("elsewhere".into()),
                owner_references: Some(vec![owner.clone()]),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner]).await;

    let result = reconciler(&store)
        .reconcile(&ObjectKey::namespaced(NS, &condition))
        .await;
    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(subjects(&store, &condition).await, vec!["etcd-operator"]);
    let binding: RoleBinding = store.get(Some(NS), &condition).await.unwrap();
    assert!(
        binding
            .subjects
            .unwrap_or_default()
            .iter()
            .all(|s| s.namespace.as_deref() == Some(NS))
    );
}

#[test_log::test(tokio::test)]
async fn role_failure_stops_before_binding() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let owner = owner_of(&csv);
    create_service_account(&store, "etcd-operator", vec![owner.clone()]).await;
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner]).await;
    store
        .fail_next::<Role>(
            Verb::Create,
            Fault::Unavailable("apiserver down".into()),
        )
        .await;

    let r = reconciler(&store);
    let key = ObjectKey::namespaced(NS, &condition);
    let result = r.reconcile(&key).await;
    assert!(result.requeue);
    assert!(matches!(result.error, Some(ReconcileErr::Rbac(_))));
    assert_eq!(store.calls::<RoleBinding>(Verb::Create).await, 0);
    assert_eq!(store.calls::<RoleBinding>(Verb::Update).await, 0);
    assert!(store.all::<Role>().await.is_empty());
    assert!(store.all::<RoleBinding>().await.is_empty());
    assert_eq!(store.calls::<Deployment>(Verb::List).await, 0);

    // the retry converges both objects
    assert!(r.reconcile(&key).await.is_ok());
    assert_eq!(subjects(&store, &condition).await, vec!["etcd-operator"]);
}

#[test_log::test(tokio::test)]
async fn owned_deployments_receive_condition_name() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let owner = owner_of(&csv);
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner.clone()]).await;

    create_deployment(
        &store,
        "etcd-operator",
        vec![
            container("manager", vec![plain("A", "1")]),
            container(
                "proxy",
                vec![plain(OPERATOR_CONDITION_ENV_VAR, "stale")],
            ),
        ],
        vec![owner.clone()],
    )
    .await;
    create_deployment(
        &store,
        "unrelated",
        vec![container("app", vec![plain("A", "1")])],
        vec![],
    )
    .await;

    let r = reconciler(&store);
    let key = ObjectKey::namespaced(NS, &condition);
    assert!(r.reconcile(&key).await.is_ok());

    let wanted = plain(OPERATOR_CONDITION_ENV_VAR, &condition);
    let owned: Deployment =
        store.get(Some(NS), "etcd-operator").await.unwrap();
    assert_eq!(
        container_env(&owned),
        vec![vec![plain("A", "1"), wanted.clone()], vec![wanted.clone()]]
    );
    let other: Deployment = store.get(Some(NS), "unrelated").await.unwrap();
    assert_eq!(container_env(&other), vec![vec![plain("A", "1")]]);
    assert_eq!(store.calls::<Deployment>(Verb::Update).await, 1);

    // already converged: no further writes
    assert!(r.reconcile(&key).await.is_ok());
    assert_eq!(store.calls::<Deployment>(Verb::Update).await, 1);
}

#[test_log::test(tokio::test)]
async fn missing_csv_owner_is_terminal() {
    let store = store();
    let condition = uniq("orphan");
    create_condition(&store, &condition, vec![]).await;

    let result = reconciler(&store)
        .reconcile(&ObjectKey::namespaced(NS, &condition))
        .await;
    assert!(!result.requeue);
    assert!(matches!(result.error, Some(ReconcileErr::MissingOwner(_))));
    assert!(store.all::<Role>().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn vanished_condition_is_done() {
    let store = store();
    let result = reconciler(&store)
        .reconcile(&ObjectKey::namespaced(NS, "gone"))
        .await;
    assert!(result.is_ok());
    assert!(!result.requeue);
    assert_eq!(store.calls::<Role>(Verb::Create).await, 0);
}

#[test_log::test(tokio::test)]
async fn load_failure_is_reported_without_requeue() {
    let store = store();
    store
        .fail_next::<oprc_olm::crd::operator_condition::OperatorCondition>(
            Verb::Get,
            Fault::Unavailable("apiserver down".into()),
        )
        .await;
    let result = reconciler(&store)
        .reconcile(&ObjectKey::namespaced(NS, "etcd-abcde"))
        .await;
    assert!(!result.requeue);
    assert!(matches!(result.error, Some(ReconcileErr::Load { .. })));
}

#[test_log::test(tokio::test)]
async fn rbac_conflict_requeues() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner_of(&csv)]).await;
    let r = reconciler(&store);
    let key = ObjectKey::namespaced(NS, &condition);
    assert!(r.reconcile(&key).await.is_ok());

    store.fail_next::<Role>(Verb::Update, Fault::Conflict).await;
    let result = r.reconcile(&key).await;
    assert!(result.requeue);
    match result.error {
        Some(ReconcileErr::Rbac(e)) => assert!(e.is_conflict()),
        other => panic!("expected rbac error, got {other:?}"),
    }

    // the next trigger converges
    assert!(r.reconcile(&key).await.is_ok());
}

#[test_log::test(tokio::test)]
async fn env_update_failure_requeues() {
    let store = store();
    let csv = create_csv(&store, "etcd.v1", &[]).await;
    let owner = owner_of(&csv);
    let condition = uniq("etcd");
    create_condition(&store, &condition, vec![owner.clone()]).await;
    create_deployment(
        &store,
        "etcd-operator",
        vec![container("manager", vec![])],
        vec![owner],
    )
    .await;

    store
        .fail_next::<Deployment>(Verb::Update, Fault::Conflict)
        .await;
    let result = reconciler(&store)
        .reconcile(&ObjectKey::namespaced(NS, &condition))
        .await;
    assert!(result.requeue);
    assert!(matches!(
        result.error,
        Some(ReconcileErr::EnvInjection { .. })
    ));
}
