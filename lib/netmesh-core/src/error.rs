use netmesh_api::EndpointStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Bouncer not found: {0}")]
    BouncerNotFound(String),

    #[error(
        "Endpoint {endpoint} in network {endpoint_net} cannot be associated with bouncer {bouncer} in network {bouncer_net}"
    )]
    InvalidScope {
        endpoint: String,
        endpoint_net: String,
        bouncer: String,
        bouncer_net: String,
    },

    #[error("{kind} {name} belongs to network {actual}, not {expected}")]
    NetworkMismatch {
        kind: &'static str,
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid status transition for endpoint {name}: {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: EndpointStatus,
        to: EndpointStatus,
    },

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether the error reports a concurrent modification of the target object
    pub fn is_conflict(&self) -> bool {
        match self {
            CoreError::Conflict(_) => true,
            CoreError::KubernetesError(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> CoreError {
        CoreError::KubernetesError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn test_conflict_classification() {
        assert!(CoreError::Conflict("endpoints/web".into()).is_conflict());
        assert!(api_error(409, "Conflict").is_conflict());
        assert!(!api_error(403, "Forbidden").is_conflict());
        assert!(!CoreError::Cancelled.is_conflict());
    }

    #[test]
    fn test_invalid_scope_message_names_both_networks() {
        let err = CoreError::InvalidScope {
            endpoint: "svc-x".into(),
            endpoint_net: "net-A".into(),
            bouncer: "lb2".into(),
            bouncer_net: "net-B".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("net-A"));
        assert!(msg.contains("net-B"));
    }
}
