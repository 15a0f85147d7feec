//! Engine configuration
//!
//! Environment variables read by [`AuthzConfig::from_env`]:
//! - `TENANTGATE_CACHE_TTL_SECS` - snapshot TTL (default: 300)
//! - `TENANTGATE_REFETCH_COOLDOWN_SECS` - minimum gap between refetches (default: 3)
//! - `TENANTGATE_REQUEST_TIMEOUT_MS` - Grant Store call budget (default: 5000)
//! - `TENANTGATE_MAX_RETRIES` - retries for transient failures (default: 2)
//! - `TENANTGATE_BRANCH_TIMEOUT_MS` - per-tenant fan-out budget (default: 5000)
//! - `TENANTGATE_NAV_MAX_VISIBLE` - navigation cap (default: 5)
//! - `TENANTGATE_STATE_DIR` - snapshot database directory (default: in-memory)

use crate::cache::CacheConfig;
use crate::client::ClientConfig;
use crate::navigation::NavigationConfig;
use crate::resolver::ResolverConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct AuthzConfig {
    pub cache: CacheConfig,
    pub client: ClientConfig,
    pub resolver: ResolverConfig,
    pub navigation: NavigationConfig,
    /// Where snapshots are persisted; `None` keeps them in memory
    pub state_dir: Option<PathBuf>,
}

impl AuthzConfig {
    /// Defaults overridden by `TENANTGATE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    /// Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |name: &str| -> Option<u64> { lookup(name).and_then(|v| parse(&v)) };
        let mut config = Self::default();

        if let Some(secs) = parsed("TENANTGATE_CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed("TENANTGATE_REFETCH_COOLDOWN_SECS") {
            config.cache.refetch_cooldown = Duration::from_secs(secs);
        }
        if let Some(ms) = parsed("TENANTGATE_REQUEST_TIMEOUT_MS") {
            config.client.request_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parsed("TENANTGATE_MAX_RETRIES") {
            config.client.retry.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        }
        if let Some(ms) = parsed("TENANTGATE_BRANCH_TIMEOUT_MS") {
            config.resolver.branch_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parsed("TENANTGATE_NAV_MAX_VISIBLE") {
            config.navigation.max_visible = usize::try_from(max).unwrap_or(usize::MAX);
        }
        config.state_dir = lookup("TENANTGATE_STATE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        config
    }
}

fn parse<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}
