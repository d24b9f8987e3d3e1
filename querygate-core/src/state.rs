use crate::affinity::{self, AffinityCache};
use crate::completion::CompletionAccountant;
use crate::conf::{GatewayConfig, ProxyPool};
use crate::load::LoadTracker;
use crate::registry::{ResourceGroup, ResourceGroupRegistry};
use crate::routing::{RoutingEngine, ServerAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Process-lifetime shared state of the gateway: the three routing
/// tables, the decision engine over them, and the completion accountant.
///
/// Each table owns its concurrency discipline internally; the state type
/// only ties construction and shutdown together.
#[derive(Debug)]
pub struct GatewayState {
    load: Arc<LoadTracker>,
    affinity: Arc<AffinityCache>,
    registry: Arc<ResourceGroupRegistry>,
    engine: RoutingEngine,
    accountant: CompletionAccountant,
    sweep_period: Duration,
}

impl GatewayState {
    pub fn new(config: &GatewayConfig) -> Self {
        let load = Arc::new(LoadTracker::new(config.weights()));
        let affinity = Arc::new(AffinityCache::new(config.cache_time()));
        let registry = Arc::new(ResourceGroupRegistry::new());
        let engine = RoutingEngine::new(load.clone(), affinity.clone(), registry.clone());
        let accountant = CompletionAccountant::new(load.clone());

        let state = Self {
            load,
            affinity,
            registry,
            engine,
            accountant,
            sweep_period: config.sweep_period(),
        };
        state.apply_routes(&config.proxy, 1);
        state
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    pub fn accountant(&self) -> &CompletionAccountant {
        &self.accountant
    }

    pub fn load(&self) -> &Arc<LoadTracker> {
        &self.load
    }

    pub fn affinity(&self) -> &Arc<AffinityCache> {
        &self.affinity
    }

    pub fn registry(&self) -> &Arc<ResourceGroupRegistry> {
        &self.registry
    }

    /// Rebuild the resource-group table from pool definitions. Called on
    /// startup and on every configuration refresh with a higher version.
    pub fn apply_routes(&self, pools: &[ProxyPool], version: u64) {
        self.registry.replace_all(build_groups(pools, version), version);
    }

    /// Spawn the affinity eviction task. The caller owns the handle and
    /// aborts it on shutdown.
    pub fn start_background(&self) -> JoinHandle<()> {
        info!(period = ?self.sweep_period, "starting affinity sweeper");
        affinity::spawn_sweeper(self.affinity.clone(), self.sweep_period)
    }

    /// Remove a server that left the pool: its load metric and every
    /// affinity binding that points at it.
    pub fn decommission_server(&self, server_id: &str) {
        self.load.remove_server(server_id);
        self.affinity.remove_by_server(server_id);
        info!(server = server_id, "decommissioned server");
    }
}

/// Pools with an unrecognized type tag never become resource groups.
fn build_groups(pools: &[ProxyPool], version: u64) -> Vec<Arc<ResourceGroup>> {
    let mut groups = Vec::with_capacity(pools.len());

    for pool in pools {
        if !pool.is_recognized() {
            debug!(host = %pool.host, pool_type = %pool.pool_type, "skipping unrecognized pool type");
            continue;
        }

        let servers: Vec<ServerAddr> = pool
            .servers
            .iter()
            .filter_map(|addr| ServerAddr::parse(addr))
            .collect();
        groups.push(Arc::new(ResourceGroup::new(
            pool.host.clone(),
            servers,
            version,
        )));
    }

    groups
}
