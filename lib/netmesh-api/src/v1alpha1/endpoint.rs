use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Endpoint represents a network-addressable service target that lives
/// in exactly one virtual network
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "netmesh.io",
    version = "v1alpha1",
    kind = "Endpoint",
    plural = "endpoints",
    shortname = "nep",
    namespaced,
    derive = "Default",
    status = "EndpointResourceStatus",
    printcolumn = r#"{"name":"Net","type":"string","jsonPath":".spec.net"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".spec.ip"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// Endpoint type: Simple or Scaled
    #[serde(rename = "type", default)]
    pub endpoint_type: EndpointType,

    /// VPC the endpoint's network belongs to
    pub vpc: String,

    /// Network (segment) of the endpoint
    pub net: String,

    /// Virtual network identifier of the VPC
    #[serde(default)]
    pub vni: String,

    /// Endpoint IP address
    #[serde(default)]
    pub ip: String,

    /// Endpoint hardware address
    #[serde(default)]
    pub mac: String,

    /// Merged backend addresses (scaled endpoints only)
    #[serde(default)]
    pub backends: Vec<String>,
}

/// Status of an Endpoint resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointResourceStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: EndpointStatus,

    /// Bouncers currently serving this endpoint
    #[serde(default)]
    pub bouncers: Vec<String>,

    /// Last update time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

/// Endpoint lifecycle phase.
///
/// Variants are declared in lifecycle order so that `Ord` follows the
/// allowed direction of travel.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    JsonSchema,
)]
pub enum EndpointStatus {
    #[default]
    Uninitialized,
    Init,
    Provisioned,
    Deleted,
}

impl EndpointStatus {
    /// The only state reachable from this one, if any
    pub fn successor(self) -> Option<EndpointStatus> {
        match self {
            EndpointStatus::Uninitialized => Some(EndpointStatus::Init),
            EndpointStatus::Init => Some(EndpointStatus::Provisioned),
            EndpointStatus::Provisioned => Some(EndpointStatus::Deleted),
            EndpointStatus::Deleted => None,
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointStatus::Uninitialized => "Uninitialized",
            EndpointStatus::Init => "Init",
            EndpointStatus::Provisioned => "Provisioned",
            EndpointStatus::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Endpoint type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EndpointType {
    /// A single workload with its own address
    #[default]
    Simple,
    /// A service fronting several replicas, addressed through its backends
    Scaled,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointType::Simple => f.write_str("Simple"),
            EndpointType::Scaled => f.write_str("Scaled"),
        }
    }
}
