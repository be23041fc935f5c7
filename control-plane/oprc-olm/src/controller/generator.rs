use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::ObjectMeta;
use tracing::{debug, info, instrument, warn};

use super::decorator::OperatorDecorator;
use super::{ReconcileErr, ReconcileResult, Reconciler};
use crate::crd::cluster_service_version::ClusterServiceVersion;
use crate::crd::operator::Operator;
use crate::crd::operator_condition::{
    OperatorCondition, OperatorConditionSpec,
};
use crate::ownership::add_non_blocking_owner;
use crate::registry::{Registry, RegistryError};
use crate::store::{ObjectKey, Store};

/// Creates the OperatorCondition of an Operator when none exists yet.
///
/// The condition lands next to the operator's single ClusterServiceVersion
/// and carries the operator's component label, so later runs find it with
/// the same selector.
pub struct OperatorConditionGenerator<S> {
    store: Arc<S>,
}

impl<S: Store> OperatorConditionGenerator<S> {
    pub fn new(
        store: Arc<S>,
        registry: &Registry,
    ) -> Result<Self, RegistryError> {
        registry.require::<Operator>()?;
        registry.require::<OperatorCondition>()?;
        registry.require::<ClusterServiceVersion>()?;
        Ok(Self { store })
    }
}

fn condition_for(
    csv: &ClusterServiceVersion,
    label_key: String,
) -> OperatorCondition {
    let mut condition = OperatorCondition {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", csv.name_any())),
            namespace: csv.namespace(),
            labels: Some(BTreeMap::from([(label_key, String::new())])),
            ..Default::default()
        },
        spec: OperatorConditionSpec::default(),
        status: None,
    };
    add_non_blocking_owner(&mut condition, csv);
    condition
}

#[async_trait]
impl<S: Store> Reconciler for OperatorConditionGenerator<S> {
    #[instrument(skip_all, fields(operator = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult {
        debug!("reconciling operator");
        let operator: Operator = match self.store.get(None, &key.name).await {
            Ok(operator) => operator,
            Err(e) if e.is_not_found() => {
                debug!("operator is gone");
                return ReconcileResult::done();
            }
            Err(source) => {
                return ReconcileResult::fail(ReconcileErr::Load {
                    key: key.clone(),
                    source,
                });
            }
        };

        let decorated = match OperatorDecorator::new(&operator) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "could not decorate operator");
                return ReconcileResult::requeue();
            }
        };
        let selector = match decorated.component_selector() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "component selector unavailable");
                return ReconcileResult::requeue();
            }
        };

        let existing: Vec<OperatorCondition> =
            match self.store.list(None, Some(&selector)).await {
                Ok(existing) => existing,
                Err(source) => {
                    return ReconcileResult::fail(ReconcileErr::List {
                        kind: "OperatorCondition",
                        source,
                    });
                }
            };
        if !existing.is_empty() {
            debug!(count = existing.len(), "operatorcondition already present");
            return ReconcileResult::done();
        }

        let mut csvs: Vec<ClusterServiceVersion> =
            match self.store.list(None, Some(&selector)).await {
                Ok(csvs) => csvs,
                Err(source) => {
                    return ReconcileResult::fail(ReconcileErr::List {
                        kind: "ClusterServiceVersion",
                        source,
                    });
                }
            };
        let csv = match csvs.len() {
            1 => csvs.remove(0),
            0 => {
                debug!(%selector, "no clusterserviceversion for operator yet");
                return ReconcileResult::done();
            }
            n => {
                warn!(
                    %selector,
                    count = n,
                    "ambiguous clusterserviceversion for operator, not generating"
                );
                return ReconcileResult::done();
            }
        };

        let label_key = match decorated.component_label_key() {
            Ok(k) => k,
            Err(e) => {
                return ReconcileResult::fail(ReconcileErr::ComponentLabel(e));
            }
        };
        let desired = condition_for(&csv, label_key);
        match self.store.create(&desired).await {
            Ok(created) => {
                info!(
                    condition = %ObjectKey::of(&created),
                    csv = %csv.name_any(),
                    "operatorcondition created"
                );
                ReconcileResult::done()
            }
            Err(source) => ReconcileResult::fail(ReconcileErr::Generate {
                csv: csv.name_any(),
                source,
            }),
        }
    }
}
