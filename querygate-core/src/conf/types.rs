use crate::load::LoadWeights;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Pool type tag recognized by the route-table builder. Pools carrying
/// any other tag are not resource groups and are skipped.
pub const POOL_TYPE_OLAP: &str = "olap";

fn default_sweep_period() -> u64 {
    30
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Weight of memory load in the composite node score.
    pub mem_weight: f64,
    /// Weight of in-flight query load in the composite node score.
    pub query_weight: f64,
    /// Normalization divisor for query load.
    pub server_size: u64,
    /// Affinity entry age ceiling, in seconds.
    pub cache_time_seconds: u64,
    /// Affinity sweep period, in seconds.
    #[serde(default = "default_sweep_period")]
    pub sweep_period_seconds: u64,
    /// Backend pool definitions.
    #[serde(default)]
    pub proxy: Vec<ProxyPool>,
}

impl GatewayConfig {
    pub fn weights(&self) -> LoadWeights {
        LoadWeights {
            mem_weight: self.mem_weight,
            query_weight: self.query_weight,
            server_size: self.server_size as f64,
        }
    }

    pub fn cache_time(&self) -> Duration {
        Duration::from_secs(self.cache_time_seconds)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_period_seconds)
    }
}

/// One backend pool definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyPool {
    /// Pool type tag; only [`POOL_TYPE_OLAP`] pools become resource groups.
    #[serde(rename = "type")]
    pub pool_type: String,
    /// Logical host (service id) the pool serves.
    pub host: String,
    /// Free-form per-pool options.
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Backend addresses as `host:port` strings.
    pub servers: Vec<String>,
}

impl ProxyPool {
    pub fn is_recognized(&self) -> bool {
        self.pool_type == POOL_TYPE_OLAP
    }
}
