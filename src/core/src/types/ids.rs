//! Identifier newtypes

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty or whitespace only
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Authenticated subject identifier
    ActorId
);
string_id!(
    /// Business unit identifier
    TenantId
);
string_id!(
    /// Grant record identifier
    GrantId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_is_transparent() {
        let id = ActorId::new("emp-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"emp-42\"");
        assert_eq!(id.to_string(), "emp-42");
    }

    #[test]
    fn test_blank_ids() {
        assert!(TenantId::new("  ").is_blank());
        assert!(!TenantId::from("salon-1").is_blank());
    }
}
