//! # TenantGate Authorization Engine
//!
//! Client-side authorization for actors who belong to several tenants at
//! once. Decisions combine a static role hierarchy, per-tenant granular
//! grants fetched from a Grant Store, and a small set of default
//! capabilities every member holds.
//!
//! ## Features
//!
//! - **Non-blocking evaluation**: `evaluate` never suspends; a missing or
//!   stale snapshot triggers a background refresh
//! - **Single-flight cache** keyed by (actor, tenant) with TTL, refetch
//!   cooldown, and last-request-wins ordering
//! - **Tenant resolution** with concurrent per-tenant fan-out
//! - **Safe degradation**: failures become zero-permission snapshots, never
//!   a false denial while loading
//! - **Durable snapshots** in `sled` for cold-start hydration
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tenantgate_authz::{AuthorizationService, AuthzConfig, InMemoryGrantStore};
//! use tenantgate_core::traits::NoopSessionTerminator;
//! use tenantgate_core::types::Screen;
//! use tenantgate_core::{Actor, Capability, CapabilityDescriptor, PermissionCode, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = AuthorizationService::new(
//!         Actor::new("emp-1", Role::Employee),
//!         Arc::new(InMemoryGrantStore::new()),
//!         AuthzConfig::default(),
//!         Arc::new(NoopSessionTerminator),
//!     )?;
//!     service.initialize().await?;
//!
//!     let reports = CapabilityDescriptor::requiring(
//!         Capability::Screen(Screen::Reports),
//!         PermissionCode::ViewReports,
//!     );
//!     if service.evaluate(&reports) {
//!         println!("Reports visible");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod roles;
pub mod client;
pub mod store;
pub mod persistence;
pub mod notify;
pub mod cache;
pub mod resolver;
pub mod evaluator;
pub mod navigation;
pub mod service;
pub mod config;

// Re-export commonly used types
pub use cache::{AuthorizationCache, CacheConfig, CacheKey, CacheStats, CachedAuthorizationState};
pub use client::{ClientConfig, GrantStoreClient, RetryConfig};
pub use config::AuthzConfig;
pub use error::{AuthzError, Result};
pub use evaluator::{decide, Decision, DenyReason, PermissionEvaluator};
pub use navigation::{NavEntry, NavigationConfig, NavigationFilter, OwnerLayoutPolicy};
pub use notify::{ChangeEvent, ChangeKind, Subscription};
pub use persistence::{MemorySnapshotStore, SledSnapshotStore, SnapshotStore};
pub use resolver::{ContextState, ResolverConfig, TenantContext, TenantContextResolver};
pub use roles::RoleRegistry;
pub use service::AuthorizationService;
pub use store::{InMemoryGrantStore, StoreFixture};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
