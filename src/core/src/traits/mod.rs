//! Collaborator traits consumed by the authorization engine

pub mod grant_store;
pub mod session;

// Re-export commonly used traits
pub use grant_store::GrantStore;
pub use session::{NoopSessionTerminator, SessionTerminator};
