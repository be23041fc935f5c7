use k8s_openapi::api::core::v1::{Container, EnvVar};

/// Env var through which an operator learns the name of its
/// OperatorCondition.
pub const OPERATOR_CONDITION_ENV_VAR: &str = "OPERATOR_CONDITION_NAME";

/// Insert `env_var` into `env_vars`, replacing an entry of the same name in
/// place. Every other entry keeps its position; a new name is appended.
pub fn ensure_env_var(env_var: EnvVar, env_vars: &[EnvVar]) -> Vec<EnvVar> {
    if env_vars.is_empty() {
        return vec![env_var];
    }

    let mut found = false;
    let mut result: Vec<EnvVar> = env_vars
        .iter()
        .map(|existing| {
            if existing.name == env_var.name {
                found = true;
                env_var.clone()
            } else {
                existing.clone()
            }
        })
        .collect();
    if !found {
        result.push(env_var);
    }
    result
}

/// Apply [`ensure_env_var`] to one container. Returns true when the
/// container's env changed.
pub fn inject_into_container(
    container: &mut Container,
    env_var: &EnvVar,
) -> bool {
    let current = container.env.as_deref().unwrap_or_default();
    let merged = ensure_env_var(env_var.clone(), current);
    if merged.as_slice() == current {
        return false;
    }
    container.env = Some(merged);
    true
}

pub fn plain(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}
