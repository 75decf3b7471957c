//! netmesh API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources reconciled by the netmesh operator:
//! - Endpoint: a network-addressable service target inside a virtual network
//! - Bouncer: a load-balancing front-end serving the endpoints of one network

pub mod v1alpha1;

pub use v1alpha1::{Bouncer, Endpoint, EndpointStatus, EndpointType};
