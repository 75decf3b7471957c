use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bouncer is a load-balancing front-end that distributes traffic to the
/// endpoints of a single network
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "netmesh.io",
    version = "v1alpha1",
    kind = "Bouncer",
    plural = "bouncers",
    shortname = "bnc",
    namespaced,
    derive = "Default",
    status = "BouncerStatus",
    printcolumn = r#"{"name":"Net","type":"string","jsonPath":".spec.net"}"#,
    printcolumn = r#"{"name":"Endpoints","type":"integer","jsonPath":".status.endpointCount"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct BouncerSpec {
    /// VPC the bouncer's network belongs to
    #[serde(default)]
    pub vpc: String,

    /// Network this bouncer load-balances for
    pub net: String,

    /// Bouncer IP address
    #[serde(default)]
    pub ip: String,

    /// Bouncer hardware address
    #[serde(default)]
    pub mac: String,
}

/// Status of a Bouncer
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BouncerStatus {
    /// Endpoints currently served
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Number of endpoints currently served
    #[serde(default)]
    pub endpoint_count: u32,
}
