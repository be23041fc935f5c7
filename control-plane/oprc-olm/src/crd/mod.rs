pub mod cluster_service_version;
pub mod operator;
pub mod operator_condition;

/// API group shared by every custom resource in this crate.
pub const GROUP: &str = "operators.coreos.com";
