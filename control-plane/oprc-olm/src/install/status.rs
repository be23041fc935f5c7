//! Deployment rollout status, as reported by `kubectl rollout status`.

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

const PROGRESS_DEADLINE_EXCEEDED: &str = "ProgressDeadlineExceeded";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolloutStatus {
    pub message: String,
    pub ready: bool,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RolloutError {
    #[error("deployment {0:?} exceeded its progress deadline")]
    ProgressDeadlineExceeded(String),
}

fn waiting(message: String) -> RolloutStatus {
    RolloutStatus {
        message,
        ready: false,
    }
}

pub fn deployment_status(
    deployment: &Deployment,
) -> Result<RolloutStatus, RolloutError> {
    let name = deployment.name_any();
    let generation = deployment.metadata.generation.unwrap_or(0);
    let Some(status) = deployment.status.as_ref() else {
        return Ok(waiting(
            "Waiting for deployment spec update to be observed...".into(),
        ));
    };
    if generation > status.observed_generation.unwrap_or(0) {
        return Ok(waiting(
            "Waiting for deployment spec update to be observed...".into(),
        ));
    }

    let progressing = status
        .conditions
        .iter()
        .flatten()
        .find(|c| c.type_ == "Progressing");
    if progressing
        .is_some_and(|c| c.reason.as_deref() == Some(PROGRESS_DEADLINE_EXCEEDED))
    {
        return Err(RolloutError::ProgressDeadlineExceeded(name));
    }

    let updated = status.updated_replicas.unwrap_or(0);
    let replicas = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas);

    if let Some(desired) = desired.filter(|d| updated < *d) {
        return Ok(waiting(format!(
            "Waiting for deployment {name:?} rollout to finish: {updated} out \
             of {desired} new replicas have been updated..."
        )));
    }
    if replicas > updated {
        return Ok(waiting(format!(
            "Waiting for deployment {name:?} rollout to finish: {} old \
             replicas are pending termination...",
            replicas - updated
        )));
    }
    if available < updated {
        return Ok(waiting(format!(
            "Waiting for deployment {name:?} rollout to finish: {available} \
             of {updated} updated replicas are available..."
        )));
    }
    Ok(RolloutStatus {
        message: format!("deployment {name:?} successfully rolled out"),
        ready: true,
    })
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{
        DeploymentCondition, DeploymentSpec, DeploymentStatus,
    };
    use kube::api::ObjectMeta;

    use super::*;

    fn deployment(
        generation: i64,
        desired: i32,
        status: DeploymentStatus,
    ) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("etcd-operator".into()),
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(status),
        }
    }

    fn observed(
        generation: i64,
        replicas: i32,
        updated: i32,
        available: i32,
    ) -> DeploymentStatus {
        DeploymentStatus {
            observed_generation: Some(generation),
            replicas: Some(replicas),
            updated_replicas: Some(updated),
            available_replicas: Some(available),
            ..Default::default()
        }
    }

    #[test]
    fn rolled_out_deployment_is_ready() {
        let dep = deployment(2, 1, observed(2, 1, 1, 1));
        let status = deployment_status(&dep).unwrap();
        assert!(status.ready);
        assert!(status.message.contains("successfully rolled out"));
    }

    #[test]
    fn pending_states_are_not_ready() {
        let cases = [
            ("generation not observed", deployment(3, 1, observed(2, 1, 1, 1))),
            ("replicas not updated", deployment(1, 3, observed(1, 3, 1, 1))),
            ("old replicas terminating", deployment(1, 1, observed(1, 2, 1, 1))),
            ("updated not available", deployment(1, 2, observed(1, 2, 2, 1))),
        ];
        for (description, dep) in cases {
            let status = deployment_status(&dep).unwrap();
            assert!(!status.ready, "{description}");
        }
        let no_status = Deployment::default();
        assert!(!deployment_status(&no_status).unwrap().ready);
    }

    #[test]
    fn progress_deadline_is_an_error() {
        let mut status = observed(1, 1, 0, 0);
        status.conditions = Some(vec![DeploymentCondition {
            type_: "Progressing".into(),
            status: "False".into(),
            reason: Some(PROGRESS_DEADLINE_EXCEEDED.into()),
            ..Default::default()
        }]);
        let dep = deployment(1, 1, status);
        assert_eq!(
            deployment_status(&dep),
            Err(RolloutError::ProgressDeadlineExceeded("etcd-operator".into()))
        );
    }
}
