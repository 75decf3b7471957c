//! Network-membership reconciliation core
//!
//! This library provides:
//! - Endpoint and Bouncer entities with network scope and lifecycle state
//! - A network-indexed store with per-network locking
//! - The reconciler that keeps bouncers mirroring the endpoints of their network
//! - The gateway trait through which decisions are persisted

pub mod backend;
pub mod bouncer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod retry;
pub mod store;

pub use backend::{merge_backend_groups, BackendAddress, BackendGroup, BackendMerge};
pub use bouncer::Bouncer;
pub use config::ReconcilerConfig;
pub use endpoint::{random_mac, Endpoint};
pub use error::{CoreError, Result};
pub use gateway::Gateway;
pub use reconciler::Reconciler;
pub use retry::RetryPolicy;
pub use store::{NetworkGuard, Store};
