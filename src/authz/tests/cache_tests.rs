//! Authorization Cache Tests
//!
//! Single-flight, TTL staleness, request ordering, cooldown, failure
//! handling, and persistence of the cache.

mod common;

use common::*;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tenantgate_authz::cache::{CacheLookup, SnapshotOrigin};
use tenantgate_authz::{
    AuthorizationCache, CacheConfig, CacheKey, ClientConfig, Decision, DenyReason, GrantStoreClient,
    MemorySnapshotStore, PermissionEvaluator, SledSnapshotStore, SnapshotStore,
};
use tenantgate_core::error::CoreError;
use tenantgate_core::traits::NoopSessionTerminator;
use tenantgate_core::types::Screen;
use tenantgate_core::{Actor, ActorId, Capability, CapabilityDescriptor, PermissionCode, Role, Tenant};
use tokio::time::advance;

fn key() -> CacheKey {
    CacheKey::new("emp-1", "salon-1")
}

fn employee() -> Actor {
    Actor::new("emp-1", Role::Employee)
}

fn salon() -> Tenant {
    Tenant::new("salon-1", "SALON-1").owned_by("owner-1")
}

fn clients_screen() -> CapabilityDescriptor {
    CapabilityDescriptor::requiring(Capability::Screen(Screen::Clients), PermissionCode::ViewClients)
}

async fn seeded_store(codes: &[PermissionCode]) -> ScriptedStore {
    let store = ScriptedStore::new();
    store.member("emp-1", "salon-1", Some("owner-1")).await;
    if !codes.is_empty() {
        store.seed("emp-1", "salon-1", codes).await;
    }
    store
}

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

#[tokio::test]
async fn test_concurrent_cold_evaluations_share_one_fetch() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let h = cache_harness(&store, CacheConfig::default());
    let evaluator = PermissionEvaluator::new(h.cache.clone());

    for _ in 0..50 {
        let decision = evaluator.evaluate(&employee(), Some(&salon()), &clients_screen());
        assert!(decision.is_pending(), "cold key must be pending, not denied");
    }

    let k = key();
    let loads = join_all((0..20).map(|_| h.cache.load(&k))).await;
    assert!(loads
        .iter()
        .all(|s| s.as_ref().is_some_and(|s| s.holds(PermissionCode::ViewClients))));

    assert_eq!(store.grant_calls(), 1);
    let stats = h.cache.stats();
    assert_eq!(stats.fetches, 1);
    assert!(stats.coalesced >= 1);
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Allow
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_across_worker_threads() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    store.delay_next("salon-1", Duration::from_millis(50));
    let h = cache_harness(&store, CacheConfig::default());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = h.cache.clone();
            tokio::spawn(async move { cache.load(&key()).await })
        })
        .collect();

    for task in tasks {
        let snapshot = task.await.unwrap();
        assert!(snapshot.is_some());
    }
    assert_eq!(store.grant_calls(), 1);
}

// ============================================================================
// TTL
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ttl_boundary_serves_stale_and_refreshes_once() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let h = cache_harness(&store, CacheConfig::default());
    let evaluator = PermissionEvaluator::new(h.cache.clone());

    // t = 0
    h.cache.load(&key()).await.unwrap();
    assert_eq!(store.grant_calls(), 1);

    // t = 4:59, served from cache without a fetch
    advance(Duration::from_secs(4 * 60 + 59)).await;
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Allow
    );
    settle().await;
    assert_eq!(store.grant_calls(), 1);

    // t = 5:01, stale result returned synchronously, one background refresh
    advance(Duration::from_secs(2)).await;
    for _ in 0..10 {
        assert_eq!(
            evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
            Decision::Allow
        );
    }
    assert!(matches!(h.cache.lookup(&key()), CacheLookup::Stale(_)));

    settle().await;
    assert_eq!(store.grant_calls(), 2);
    assert!(matches!(h.cache.lookup(&key()), CacheLookup::Fresh(_)));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_suppresses_refetch() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let config = CacheConfig {
        ttl: Duration::from_secs(1),
        refetch_cooldown: Duration::from_secs(3),
        ..Default::default()
    };
    let h = cache_harness(&store, config);

    h.cache.load(&key()).await.unwrap();

    advance(Duration::from_secs(2)).await;
    assert!(matches!(h.cache.lookup_and_revalidate(&key()), CacheLookup::Stale(_)));
    settle().await;
    assert_eq!(store.grant_calls(), 1);
    assert_eq!(h.cache.stats().suppressed, 1);

    advance(Duration::from_secs(2)).await;
    h.cache.lookup_and_revalidate(&key());
    settle().await;
    assert_eq!(store.grant_calls(), 2);
}

// ============================================================================
// REQUEST ORDERING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_older_response_never_overwrites_newer() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let h = cache_harness(&store, CacheConfig::default());

    // First fetch reads the old grant set and answers late
    store.delay_next("salon-1", Duration::from_secs(2));
    let slow = h.cache.request_refresh(&key(), false).unwrap();
    settle().await;

    store.seed("emp-1", "salon-1", &[PermissionCode::ViewReports]).await;
    let fast = h.cache.request_refresh(&key(), true).unwrap();
    fast.await;

    let newer = h.cache.snapshot(&key()).unwrap();
    assert!(newer.holds(PermissionCode::ViewReports));

    slow.await;
    let after = h.cache.snapshot(&key()).unwrap();
    assert_eq!(after.version, newer.version);
    assert!(after.holds(PermissionCode::ViewReports));
    assert_eq!(h.cache.stats().discarded, 1);
}

#[tokio::test]
async fn test_versions_increase_across_refreshes() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let h = cache_harness(&store, CacheConfig::default());

    let first = h.cache.refresh(&key()).await.unwrap();
    let second = h.cache.refresh(&key()).await.unwrap();
    assert!(second.version > first.version);
}

// ============================================================================
// FAILURE HANDLING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_network_failure_degrades_to_zero_permissions() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    store.fail_next("salon-1", CoreError::network("connection reset"));
    let h = cache_harness(&store, CacheConfig::default());
    let evaluator = PermissionEvaluator::new(h.cache.clone());

    let snapshot = h.cache.load(&key()).await.unwrap();
    assert_eq!(snapshot.origin, SnapshotOrigin::Degraded);
    assert_eq!(snapshot.permission_count(), 0);
    assert_eq!(h.cache.stats().degraded, 1);

    // Degraded snapshots grant nothing, not even defaults
    let schedule = CapabilityDescriptor::requiring(
        Capability::Screen(Screen::MySchedule),
        PermissionCode::ViewOwnSchedule,
    );
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &schedule),
        Decision::Deny(DenyReason::MissingPermission)
    );
    assert!(h.snapshots.load_actor(&ActorId::from("emp-1")).unwrap().is_empty());

    // Stale from the start: the next use after the cooldown recovers
    advance(Duration::from_secs(3)).await;
    evaluator.evaluate(&employee(), Some(&salon()), &clients_screen());
    settle().await;
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Allow
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetch_degrades_and_recovers() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    store.panic_next("salon-1");
    let h = cache_harness(&store, CacheConfig::default());
    let evaluator = PermissionEvaluator::new(h.cache.clone());

    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Pending
    );
    settle().await;

    // The dead task no longer holds the key in a loading state
    assert!(!matches!(h.cache.lookup(&key()), CacheLookup::Loading));
    let snapshot = h.cache.snapshot(&key()).unwrap();
    assert_eq!(snapshot.origin, SnapshotOrigin::Degraded);
    assert_eq!(h.cache.stats().degraded, 1);

    advance(Duration::from_secs(3)).await;
    evaluator.evaluate(&employee(), Some(&salon()), &clients_screen());
    settle().await;
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Allow
    );
    assert_eq!(h.cache.stats().fetches, 2);
}

#[tokio::test]
async fn test_retain_last_known_good_keeps_snapshot() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let config = CacheConfig {
        retain_last_known_good: true,
        ..Default::default()
    };
    let h = cache_harness(&store, config);

    h.cache.load(&key()).await.unwrap();
    store.fail_next("salon-1", CoreError::Timeout);
    let snapshot = h.cache.refresh(&key()).await.unwrap();

    assert_eq!(snapshot.origin, SnapshotOrigin::Fetched);
    assert!(snapshot.holds(PermissionCode::ViewClients));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    store.fail_next("salon-1", CoreError::network("reset"));
    store.fail_next("salon-1", CoreError::Timeout);

    let client = GrantStoreClient::new(Arc::new(store.clone()), ClientConfig::default());
    let cache = AuthorizationCache::new(
        CacheConfig::default(),
        client,
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(NoopSessionTerminator),
    )
    .unwrap();

    let snapshot = cache.load(&key()).await.unwrap();
    assert_eq!(snapshot.origin, SnapshotOrigin::Fetched);
    assert_eq!(store.grant_calls(), 3);
}

#[tokio::test]
async fn test_auth_expired_ends_session_without_denying() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    store.fail_next("salon-1", CoreError::AuthExpired);
    let h = cache_harness(&store, CacheConfig::default());
    let evaluator = PermissionEvaluator::new(h.cache.clone());

    assert!(evaluator
        .evaluate(&employee(), Some(&salon()), &clients_screen())
        .is_pending());
    settle().await;

    assert_eq!(h.terminator.count(), 1);
    assert!(h.cache.is_session_expired(&ActorId::from("emp-1")));
    let decision = evaluator.evaluate(&employee(), Some(&salon()), &clients_screen());
    assert!(!decision.is_denied());
    settle().await;
    assert_eq!(store.grant_calls(), 1, "no fetches after the session expired");
    assert_eq!(h.terminator.count(), 1);
}

#[tokio::test]
async fn test_auth_expired_leaves_existing_snapshot() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    let h = cache_harness(&store, CacheConfig::default());
    h.cache.load(&key()).await.unwrap();

    store.fail_next("salon-1", CoreError::AuthExpired);
    let snapshot = h.cache.refresh(&key()).await.unwrap();
    assert_eq!(snapshot.origin, SnapshotOrigin::Fetched);
    assert!(snapshot.holds(PermissionCode::ViewClients));
    assert_eq!(h.terminator.count(), 1);

    // A new session after logout may fetch again
    h.cache.purge_actor(&ActorId::from("emp-1")).unwrap();
    assert!(!h.cache.is_session_expired(&ActorId::from("emp-1")));
    assert!(h.cache.load(&key()).await.is_some());
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_cold_start_serves_persisted_snapshot_then_revalidates() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(SledSnapshotStore::open(dir.path()).unwrap());
    let store = seeded_store(&[PermissionCode::ViewClients]).await;

    {
        let first = cache_with(&store, CacheConfig::default(), snapshots.clone());
        first.cache.load(&key()).await.unwrap();
    }
    store.unseed("emp-1", "salon-1", &[PermissionCode::ViewClients]).await;

    let second = cache_with(&store, CacheConfig::default(), snapshots.clone());
    assert_eq!(second.cache.hydrate(&ActorId::from("emp-1")).unwrap(), 1);
    let evaluator = PermissionEvaluator::new(second.cache.clone());

    // Last known good answers before revalidation
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Allow
    );
    settle().await;
    assert_eq!(
        evaluator.evaluate(&employee(), Some(&salon()), &clients_screen()),
        Decision::Deny(DenyReason::MissingPermission)
    );

    second.cache.purge_actor(&ActorId::from("emp-1")).unwrap();
    assert!(snapshots.load_actor(&ActorId::from("emp-1")).unwrap().is_empty());
    assert!(second.cache.keys_for(&ActorId::from("emp-1")).is_empty());
}

#[tokio::test]
async fn test_purge_discards_in_flight_response() {
    let store = seeded_store(&[PermissionCode::ViewClients]).await;
    store.delay_next("salon-1", Duration::from_millis(20));
    let h = cache_harness(&store, CacheConfig::default());

    let pending = h.cache.request_refresh(&key(), false).unwrap();
    h.cache.purge_actor(&ActorId::from("emp-1")).unwrap();
    pending.await;

    assert!(h.cache.snapshot(&key()).is_none());
    assert!(h.snapshots.load_actor(&ActorId::from("emp-1")).unwrap().is_empty());
    assert_eq!(h.cache.stats().discarded, 1);
}
