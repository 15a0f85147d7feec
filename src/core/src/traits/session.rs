//! Session termination hook

use crate::types::ActorId;

/// Receives the signal that the actor's credential expired.
///
/// Called at most once per expiry, from whichever task observed it.
pub trait SessionTerminator: Send + Sync {
    fn session_expired(&self, actor_id: &ActorId);
}

/// Terminator that ignores the signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionTerminator;

impl SessionTerminator for NoopSessionTerminator {
    fn session_expired(&self, _actor_id: &ActorId) {}
}
