//! Durable snapshot persistence
//!
//! Last-known-good authorization snapshots are stored per actor so a cold
//! start can serve them before revalidating. Layout in the `sled` tree:
//!
//! ```text
//! snapshot/<len>:<actor>/<len>:<tenant>  -> PersistedSnapshot (JSON)
//! active/<len>:<actor>                   -> tenant id (UTF-8)
//! ```
//!
//! Segments carry their byte length so an actor id containing `/` cannot
//! fall under another actor's prefix.

use crate::error::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tenantgate_core::{ActorId, PermissionCode, TenantId};
use tracing::debug;

/// Snapshot as written to local storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    pub granted_permission_codes: Vec<PermissionCode>,
    pub fetched_at: DateTime<Utc>,
}

/// Local store for last-known-good snapshots
pub trait SnapshotStore: Send + Sync {
    /// Overwrite the snapshot for (actor, tenant)
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<()>;

    /// Every snapshot stored for an actor
    fn load_actor(&self, actor_id: &ActorId) -> Result<Vec<PersistedSnapshot>>;

    /// Remember the actor's active tenant
    fn save_active_tenant(&self, actor_id: &ActorId, tenant_id: &TenantId) -> Result<()>;

    /// Previously active tenant, if any
    fn load_active_tenant(&self, actor_id: &ActorId) -> Result<Option<TenantId>>;

    /// Remove everything stored for an actor
    fn purge_actor(&self, actor_id: &ActorId) -> Result<()>;
}

fn segment(id: &str) -> String {
    format!("{}:{}", id.len(), id)
}

fn snapshot_prefix(actor_id: &ActorId) -> String {
    format!("snapshot/{}/", segment(actor_id.as_str()))
}

fn snapshot_key(actor_id: &ActorId, tenant_id: &TenantId) -> String {
    format!("{}{}", snapshot_prefix(actor_id), segment(tenant_id.as_str()))
}

fn active_key(actor_id: &ActorId) -> String {
    format!("active/{}", segment(actor_id.as_str()))
}

/// `sled`-backed snapshot store
#[derive(Clone)]
pub struct SledSnapshotStore {
    db: sled::Db,
}

impl SledSnapshotStore {
    /// Open (or create) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Store that lives only as long as the process
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl SnapshotStore for SledSnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let key = snapshot_key(&snapshot.actor_id, &snapshot.tenant_id);
        let value = serde_json::to_vec(snapshot)?;
        self.db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn load_actor(&self, actor_id: &ActorId) -> Result<Vec<PersistedSnapshot>> {
        let mut snapshots = Vec::new();
        for item in self.db.scan_prefix(snapshot_prefix(actor_id).as_bytes()) {
            let (_, value) = item?;
            snapshots.push(serde_json::from_slice(&value)?);
        }
        Ok(snapshots)
    }

    fn save_active_tenant(&self, actor_id: &ActorId, tenant_id: &TenantId) -> Result<()> {
        self.db
            .insert(active_key(actor_id).as_bytes(), tenant_id.as_str().as_bytes())?;
        Ok(())
    }

    fn load_active_tenant(&self, actor_id: &ActorId) -> Result<Option<TenantId>> {
        let value = self.db.get(active_key(actor_id).as_bytes())?;
        Ok(value.map(|bytes| TenantId::new(String::from_utf8_lossy(&bytes).into_owned())))
    }

    fn purge_actor(&self, actor_id: &ActorId) -> Result<()> {
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for item in self.db.scan_prefix(snapshot_prefix(actor_id).as_bytes()) {
            let (key, _) = item?;
            batch.remove(key);
            removed += 1;
        }
        batch.remove(active_key(actor_id).as_bytes());
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        debug!("Purged {} persisted snapshots for actor={}", removed, actor_id);
        Ok(())
    }
}

/// Process-local snapshot store, used when no state directory is configured
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<(ActorId, TenantId), PersistedSnapshot>,
    active: DashMap<ActorId, TenantId>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        self.snapshots.insert(
            (snapshot.actor_id.clone(), snapshot.tenant_id.clone()),
            snapshot.clone(),
        );
        Ok(())
    }

    fn load_actor(&self, actor_id: &ActorId) -> Result<Vec<PersistedSnapshot>> {
        Ok(self
            .snapshots
            .iter()
            .filter(|entry| &entry.key().0 == actor_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn save_active_tenant(&self, actor_id: &ActorId, tenant_id: &TenantId) -> Result<()> {
        self.active.insert(actor_id.clone(), tenant_id.clone());
        Ok(())
    }

    fn load_active_tenant(&self, actor_id: &ActorId) -> Result<Option<TenantId>> {
        Ok(self.active.get(actor_id).map(|t| t.value().clone()))
    }

    fn purge_actor(&self, actor_id: &ActorId) -> Result<()> {
        self.snapshots.retain(|(actor, _), _| actor != actor_id);
        self.active.remove(actor_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(actor: &str, tenant: &str) -> PersistedSnapshot {
        PersistedSnapshot {
            actor_id: ActorId::from(actor),
            tenant_id: TenantId::from(tenant),
            granted_permission_codes: vec![PermissionCode::ViewClients],
            fetched_at: Utc::now(),
        }
    }

    fn exercise(store: &dyn SnapshotStore) {
        let alice = ActorId::from("alice");
        store.save(&snapshot("alice", "salon-1")).unwrap();
        store.save(&snapshot("alice", "salon-2")).unwrap();
        store.save(&snapshot("alicia", "salon-1")).unwrap();
        store.save(&snapshot("alice/x", "salon-1")).unwrap();
        store.save_active_tenant(&ActorId::from("alice/x"), &TenantId::from("salon-1")).unwrap();
        store.save_active_tenant(&alice, &TenantId::from("salon-2")).unwrap();

        let loaded = store.load_actor(&alice).unwrap();
        assert_eq!(loaded.len(), 2, "prefix must not leak into other actors");
        assert_eq!(
            store.load_active_tenant(&alice).unwrap(),
            Some(TenantId::from("salon-2"))
        );

        store.purge_actor(&alice).unwrap();
        assert!(store.load_actor(&alice).unwrap().is_empty());
        assert!(store.load_active_tenant(&alice).unwrap().is_none());
        assert_eq!(store.load_actor(&ActorId::from("alicia")).unwrap().len(), 1);
        let nested = ActorId::from("alice/x");
        assert_eq!(store.load_actor(&nested).unwrap().len(), 1, "purge must not reach alice/x");
        assert_eq!(
            store.load_active_tenant(&nested).unwrap(),
            Some(TenantId::from("salon-1"))
        );
    }

    #[test]
    fn test_sled_store() {
        let store = SledSnapshotStore::temporary().unwrap();
        exercise(&store);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySnapshotStore::new());
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledSnapshotStore::open(dir.path()).unwrap();
            store.save(&snapshot("bob", "salon-1")).unwrap();
            store.db.flush().unwrap();
        }
        let store = SledSnapshotStore::open(dir.path()).unwrap();
        let loaded = store.load_actor(&ActorId::from("bob")).unwrap();
        assert_eq!(loaded[0].granted_permission_codes, vec![PermissionCode::ViewClients]);
    }
}
