#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, ServiceAccount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, OwnerReference,
};
use kube::api::ObjectMeta;
use oprc_olm::crd::cluster_service_version::{
    ClusterServiceVersion, ClusterServiceVersionSpec,
};
use oprc_olm::crd::operator::{Operator, OperatorSpec};
use oprc_olm::crd::operator_condition::{
    OperatorCondition, OperatorConditionSpec,
};
use oprc_olm::ownership::non_blocking_owner;
use oprc_olm::store::{MemoryStore, Store};

pub const NS: &str = "operators";

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

fn meta(name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NS.to_string()),
        labels: (!labels.is_empty()).then(|| {
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        }),
        ..Default::default()
    }
}

pub async fn create_csv(
    store: &MemoryStore,
    name: &str,
    labels: &[(&str, &str)],
) -> ClusterServiceVersion {
    let csv = ClusterServiceVersion {
        metadata: meta(name, labels),
        spec: ClusterServiceVersionSpec::default(),
        status: None,
    };
    store.create(&csv).await.expect("create csv")
}

pub fn owner_of(csv: &ClusterServiceVersion) -> OwnerReference {
    non_blocking_owner(csv).expect("persisted csv")
}

pub async fn create_condition(
    store: &MemoryStore,
    name: &str,
    owners: Vec<OwnerReference>,
) -> OperatorCondition {
    let mut metadata = meta(name, &[]);
    metadata.owner_references = Some(owners);
    let condition = OperatorCondition {
        metadata,
        spec: OperatorConditionSpec::default(),
        status: None,
    };
    store.create(&condition).await.expect("create condition")
}

pub async fn create_service_account(
    store: &MemoryStore,
    name: &str,
    owners: Vec<OwnerReference>,
) -> ServiceAccount {
    let mut metadata = meta(name, &[]);
    metadata.owner_references = Some(owners);
    let sa = ServiceAccount {
        metadata,
        ..Default::default()
    };
    store.create(&sa).await.expect("create serviceaccount")
}

pub fn deployment(name: &str, containers: Vec<Container>) -> Deployment {
    Deployment {
        metadata: meta(name, &[]),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    name.to_string(),
                )])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn container(name: &str, env: Vec<EnvVar>) -> Container {
    Container {
        name: name.to_string(),
        image: Some("quay.io/example/operator:latest".into()),
        env: (!env.is_empty()).then_some(env),
        ..Default::default()
    }
}

pub async fn create_deployment(
    store: &MemoryStore,
    name: &str,
    containers: Vec<Container>,
    owners: Vec<OwnerReference>,
) -> Deployment {
    let mut dep = deployment(name, containers);
    dep.metadata.owner_references = Some(owners);
    store.create(&dep).await.expect("create deployment")
}

pub async fn create_operator(store: &MemoryStore, name: &str) -> Operator {
    store
        .create(&Operator::new(name, OperatorSpec {}))
        .await
        .expect("create operator")
}

pub fn container_env(dep: &Deployment) -> Vec<Vec<EnvVar>> {
    dep.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|p| {
            p.containers
                .iter()
                .map(|c| c.env.clone().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}
