//! # TenantGate Probe
//!
//! Resolves an actor's tenant context against a JSON Grant Store fixture and
//! prints what the session would see: tenants, the active tenant, visible
//! navigation, and per-screen decisions.
//!
//! ## Usage
//!
//! ```text
//! tenantgate-probe <fixture.json> <actor-id> <role> [tenant-id]
//! ```
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG` - Log level (default: info)
//! - `TENANTGATE_*` - Engine settings, see `AuthzConfig::from_env`

use anyhow::{bail, Context};
use serde::Serialize;
use std::sync::Arc;
use tenantgate_authz::resolver::Resolution;
use tenantgate_authz::{
    AuthorizationService, AuthzConfig, CacheStats, Decision, InMemoryGrantStore, NavEntry, StoreFixture,
};
use tenantgate_core::types::Screen;
use tenantgate_core::{Actor, ActorId, Capability, CapabilityDescriptor, Requirement, Role, SessionTerminator, TenantId};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs the expiry; the probe has no session to end
struct LoggingTerminator;

impl SessionTerminator for LoggingTerminator {
    fn session_expired(&self, actor_id: &ActorId) {
        warn!("Session expired for actor={}", actor_id);
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScreenDecision {
    screen: Screen,
    decision: Decision,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport {
    actor: Actor,
    resolution: Resolution,
    navigation: Vec<NavEntry>,
    screens: Vec<ScreenDecision>,
    cache: CacheStats,
}

/// Requirement used for each screen in the report
fn screen_requirement(screen: Screen) -> Requirement {
    use tenantgate_core::PermissionCode::*;
    match screen {
        Screen::Dashboard | Screen::Profile => Requirement::Public,
        Screen::Appointments => Requirement::any([ViewAllAppointments, ManageAppointments]),
        Screen::MySchedule => Requirement::Single { code: ViewOwnSchedule },
        Screen::Clients => Requirement::any([ViewClients, ManageClients]),
        Screen::Services => Requirement::any([ViewServices, ManageServices]),
        Screen::Sales => Requirement::any([ProcessSales, IssueRefunds]),
        Screen::Inventory => Requirement::any([ViewInventory, ManageInventory]),
        Screen::Staff => Requirement::any([ViewStaff, ManageStaff]),
        Screen::Reports => Requirement::Single { code: ViewReports },
        Screen::Settings => Requirement::Single { code: ManageSettings },
        Screen::AdminConsole => Requirement::Single { code: ManagePermissions },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting TenantGate probe v{}", tenantgate_authz::VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: tenantgate-probe <fixture.json> <actor-id> <role> [tenant-id]");
    }

    let raw = std::fs::read_to_string(&args[0]).with_context(|| format!("reading fixture {}", args[0]))?;
    let fixture: StoreFixture = serde_json::from_str(&raw).context("parsing fixture")?;
    let role: Role = args[2].parse()?;
    let actor = Actor::new(args[1].as_str(), role);

    let config = AuthzConfig::from_env();
    info!("Configuration:");
    info!("  Cache TTL: {:?}", config.cache.ttl);
    info!("  Request timeout: {:?}", config.client.request_timeout);
    info!("  State dir: {:?}", config.state_dir);

    let service = AuthorizationService::new(
        actor.clone(),
        Arc::new(InMemoryGrantStore::from_fixture(fixture)),
        config,
        Arc::new(LoggingTerminator),
    )?;

    let mut resolution = service.initialize().await?;
    if let Some(tenant_id) = args.get(3) {
        let context = service.set_active_tenant(&TenantId::from(tenant_id.as_str())).await?;
        resolution.active = Some(context);
        resolution.reason = None;
    }

    let screens = [
        Screen::Dashboard,
        Screen::Appointments,
        Screen::MySchedule,
        Screen::Clients,
        Screen::Services,
        Screen::Sales,
        Screen::Inventory,
        Screen::Staff,
        Screen::Reports,
        Screen::Settings,
        Screen::Profile,
        Screen::AdminConsole,
    ]
    .into_iter()
    .map(|screen| ScreenDecision {
        screen,
        decision: service.decide(&CapabilityDescriptor {
            capability: Capability::Screen(screen),
            requirement: screen_requirement(screen),
        }),
    })
    .collect();

    let report = ProbeReport {
        actor,
        resolution,
        navigation: service.visible_navigation(),
        screens,
        cache: service.cache_stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
