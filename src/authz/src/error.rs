//! Error types for the authorization engine

use tenantgate_core::{CoreError, TenantId};
use thiserror::Error;

/// Authorization engine errors
///
/// Only the fetch and mutation boundary returns these. Evaluation never
/// fails; fetch errors are turned into safe-deny snapshots before they reach
/// the evaluator.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Grant Store unreachable (transient)
    #[error("Network error: {0}")]
    Network(String),

    /// Grant Store call exceeded its time budget (transient)
    #[error("Request timed out")]
    Timeout,

    /// Credential no longer valid; the session must end
    #[error("Authentication expired")]
    AuthExpired,

    /// The actor holds no active membership for the tenant
    #[error("Actor is not a member of tenant {tenant_id}")]
    NotAMember { tenant_id: TenantId },

    /// Malformed or unauthorized grant/revoke request
    #[error("Validation error: {0}")]
    Validation(String),

    /// Snapshot persistence failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No tokio runtime available to run background refreshes
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Whether the failed call may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthzError::Network(_) | AuthzError::Timeout)
    }
}

impl From<CoreError> for AuthzError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network(msg) => AuthzError::Network(msg),
            CoreError::Timeout => AuthzError::Timeout,
            CoreError::AuthExpired => AuthzError::AuthExpired,
            CoreError::NotAMember(tenant) => AuthzError::NotAMember {
                tenant_id: TenantId::new(tenant),
            },
            CoreError::Validation(msg) => AuthzError::Validation(msg),
            CoreError::Rejected(msg) => AuthzError::Validation(format!("rejected by grant store: {msg}")),
            CoreError::UnknownPermission(code) => {
                AuthzError::Validation(format!("unknown permission code {code}"))
            }
            CoreError::UnknownRole(role) => AuthzError::Validation(format!("unknown role {role}")),
        }
    }
}

impl From<sled::Error> for AuthzError {
    fn from(err: sled::Error) -> Self {
        AuthzError::Persistence(err.to_string())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
