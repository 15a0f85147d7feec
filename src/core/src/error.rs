//! Error types shared by Grant Store implementations and the engine
//!
//! Grant Store implementations classify their failures into this enum so the
//! engine can decide whether to retry, degrade, or end the session.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for TenantGate collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Transport-level failure talking to the Grant Store (transient)
    #[error("Network error: {0}")]
    Network(String),

    /// The Grant Store did not answer in time (transient)
    #[error("Timeout")]
    Timeout,

    /// The credential used to talk to the Grant Store is no longer valid
    #[error("Authentication expired")]
    AuthExpired,

    /// The actor holds no membership for the tenant
    #[error("Not a member of tenant {0}")]
    NotAMember(String),

    /// Malformed grant or revoke request
    #[error("Validation error: {0}")]
    Validation(String),

    /// The Grant Store refused the request for a business reason
    #[error("Rejected: {0}")]
    Rejected(String),

    /// A permission code string that is not part of the catalog
    #[error("Unknown permission code: {0}")]
    UnknownPermission(String),

    /// A role string that is not part of the role hierarchy
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

impl CoreError {
    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        CoreError::Network(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        CoreError::Validation(msg.into())
    }

    /// Create a rejection error
    pub fn rejected<S: Into<String>>(msg: S) -> Self {
        CoreError::Rejected(msg.into())
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Network(_) | CoreError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = CoreError::network("connection reset");
        assert!(matches!(err, CoreError::Network(_)));

        let err = CoreError::validation("empty code list");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::network("connection failed");
        assert_eq!(err.to_string(), "Network error: connection failed");

        let err = CoreError::NotAMember("salon-2".into());
        assert_eq!(err.to_string(), "Not a member of tenant salon-2");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::Timeout.is_transient());
        assert!(CoreError::network("down").is_transient());
        assert!(!CoreError::AuthExpired.is_transient());
        assert!(!CoreError::validation("bad").is_transient());
    }
}
