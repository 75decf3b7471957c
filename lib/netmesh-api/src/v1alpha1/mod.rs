/// API version v1alpha1 for netmesh CRDs

pub mod bouncer;
pub mod endpoint;

pub use bouncer::{Bouncer, BouncerSpec, BouncerStatus};
pub use endpoint::{Endpoint, EndpointResourceStatus, EndpointSpec, EndpointStatus, EndpointType};

/// API group for netmesh resources
pub const API_GROUP: &str = "netmesh.io";
/// API version for netmesh resources
pub const API_VERSION: &str = "v1alpha1";
