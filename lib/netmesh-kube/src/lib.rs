//! Kubernetes integration for the netmesh reconciler
pub mod convert;
pub mod gateway;

pub use convert::{backend_groups, is_managed, to_resource};
pub use gateway::KubeGateway;
