use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OlmConfig {
    #[envconfig(from = "OPRC_OLM_PROFILE", default = "dev")]
    pub profile: String,

    /// Default tracing directive when RUST_LOG does not override it.
    /// Env: OPRC_OLM_LOG
    #[envconfig(from = "OPRC_OLM_LOG", default = "info")]
    pub log_level: String,

    /// Restrict the OperatorCondition watch to one namespace.
    /// Env: OPRC_OLM_WATCH_NAMESPACE
    #[envconfig(from = "OPRC_OLM_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Delay before a failed reconcile that asked for requeue runs again.
    /// Env: OPRC_OLM_ERROR_REQUEUE_SECS
    #[envconfig(from = "OPRC_OLM_ERROR_REQUEUE_SECS", default = "5")]
    pub error_requeue_secs: u64,

    #[envconfig(nested)]
    pub controllers: ControllersConfig,
}

#[derive(Envconfig, Clone, Debug, Default)]
pub struct ControllersConfig {
    /// If Some, env explicitly set; otherwise, profile defaults apply
    #[envconfig(from = "OPRC_OLM_CONTROLLER_CONDITION")]
    pub condition: Option<bool>,
    #[envconfig(from = "OPRC_OLM_CONTROLLER_GENERATOR")]
    pub generator: Option<bool>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no controller enabled (profile {0})")]
    NothingToRun(String),
    #[error("OPRC_OLM_WATCH_NAMESPACE must not be empty when set")]
    EmptyNamespace,
}

impl OlmConfig {
    /// Apply profile → defaults mapping, while respecting explicit env overrides.
    ///
    /// - dev, full: condition=true, generator=true
    /// - edge: condition=true, generator=false (conditions are pre-provisioned)
    pub fn apply_profile_defaults(mut self) -> Self {
        let (def_condition, def_generator) = match self.profile.as_str() {
            "edge" => (true, false),
            _ /* dev | full */ => (true, true),
        };
        if self.controllers.condition.is_none() {
            self.controllers.condition = Some(def_condition);
        }
        if self.controllers.generator.is_none() {
            self.controllers.generator = Some(def_generator);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.watch_namespace.as_deref(), Some(ns) if ns.trim().is_empty())
        {
            return Err(ConfigError::EmptyNamespace);
        }
        if !self.condition_enabled() && !self.generator_enabled() {
            return Err(ConfigError::NothingToRun(self.profile.clone()));
        }
        Ok(())
    }

    pub fn condition_enabled(&self) -> bool {
        self.controllers.condition.unwrap_or(true)
    }

    pub fn generator_enabled(&self) -> bool {
        self.controllers.generator.unwrap_or(true)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}
