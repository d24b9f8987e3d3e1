use querygate_core::conf::types::{GatewayConfig, ProxyPool};
use querygate_core::state::GatewayState;
use std::collections::HashMap;

/// Build a gateway state over one `olap` pool with the given backends.
pub fn test_state(cache_time_seconds: u64, service_id: &str, servers: &[&str]) -> GatewayState {
    let config = GatewayConfig {
        mem_weight: 0.5,
        query_weight: 0.5,
        server_size: 10,
        cache_time_seconds,
        sweep_period_seconds: 30,
        proxy: vec![ProxyPool {
            pool_type: "olap".to_string(),
            host: service_id.to_string(),
            config: HashMap::new(),
            servers: servers.iter().map(|s| s.to_string()).collect(),
        }],
    };

    GatewayState::new(&config)
}
