//! Evaluator and navigation benchmarks
//!
//! `evaluate` runs on every render, so the warm path must stay a map lookup
//! plus a set probe.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tenantgate_authz::navigation::TenantAccess;
use tenantgate_authz::{
    decide, AuthorizationCache, CacheConfig, CacheKey, CachedAuthorizationState, ClientConfig, GrantStoreClient,
    InMemoryGrantStore, MemorySnapshotStore, NavigationConfig, NavigationFilter, PermissionEvaluator, RoleRegistry,
};
use tenantgate_core::traits::NoopSessionTerminator;
use tenantgate_core::types::Screen;
use tenantgate_core::{
    Actor, Capability, CapabilityDescriptor, GrantRequest, GrantStore, MembershipRecord, PermissionCode, Requirement,
    Role, Tenant, TenantId,
};
use tokio::runtime::Runtime;

fn warm_evaluator(rt: &Runtime, grants: usize) -> PermissionEvaluator {
    rt.block_on(async {
        let store = InMemoryGrantStore::new();
        store
            .add_membership(
                "emp-1",
                MembershipRecord {
                    tenant_id: TenantId::from("salon-1"),
                    tenant_name: "Downtown".into(),
                    local_membership_id: "staff-1".into(),
                    is_active: true,
                    owner_id: None,
                },
            )
            .await;
        let codes: Vec<PermissionCode> = PermissionCode::ALL
            .iter()
            .copied()
            .filter(|code| !code.is_default())
            .take(grants)
            .collect();
        if !codes.is_empty() {
            store
                .grant(GrantRequest {
                    tenant_id: TenantId::from("salon-1"),
                    actor_id: "emp-1".into(),
                    permission_codes: codes,
                    granted_by: "owner-1".into(),
                    notes: None,
                })
                .await
                .unwrap();
        }

        let client = GrantStoreClient::new(Arc::new(store), ClientConfig::default());
        let cache = AuthorizationCache::new(
            CacheConfig::default(),
            client,
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(NoopSessionTerminator),
        )
        .unwrap();
        cache.load(&CacheKey::new("emp-1", "salon-1")).await.unwrap();
        PermissionEvaluator::new(cache)
    })
}

fn bench_evaluate_warm(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let actor = Actor::new("emp-1", Role::Employee);
    let tenant = Tenant::new("salon-1", "Downtown");
    let descriptor = CapabilityDescriptor::requiring_any(
        Capability::Screen(Screen::Reports),
        [PermissionCode::ViewReports, PermissionCode::ManageSettings],
    );

    let mut group = c.benchmark_group("evaluate_warm");
    for grants in [0usize, 5, 17] {
        let evaluator = warm_evaluator(&rt, grants);
        group.bench_with_input(BenchmarkId::new("grants", grants), &grants, |b, _| {
            b.iter(|| evaluator.evaluate(black_box(&actor), Some(black_box(&tenant)), black_box(&descriptor)))
        });
    }
    group.finish();
}

fn bench_decide(c: &mut Criterion) {
    let snapshot = CachedAuthorizationState::from_codes(
        &CacheKey::new("emp-1", "salon-1"),
        [PermissionCode::ViewClients, PermissionCode::ProcessSales],
    );
    let requirement = Requirement::all([PermissionCode::ViewClients, PermissionCode::ProcessSales]);

    c.bench_function("decide_all_mode", |b| {
        b.iter(|| decide(black_box(&requirement), Some(black_box(&snapshot))))
    });
}

fn bench_navigation(c: &mut Criterion) {
    let filter = NavigationFilter::new(NavigationConfig::default());
    let registry = RoleRegistry::new();
    let snapshot = CachedAuthorizationState::from_codes(
        &CacheKey::new("emp-1", "salon-1"),
        [
            PermissionCode::ManageAppointments,
            PermissionCode::ViewClients,
            PermissionCode::ProcessSales,
            PermissionCode::ViewReports,
            PermissionCode::ViewInventory,
        ],
    );

    c.bench_function("visible_navigation_staff", |b| {
        b.iter(|| {
            filter.visible_for(
                black_box(&registry),
                Role::Employee,
                TenantAccess::Snapshot(Some(black_box(&snapshot))),
            )
        })
    });
}

criterion_group!(benches, bench_evaluate_warm, bench_decide, bench_navigation);
criterion_main!(benches);
