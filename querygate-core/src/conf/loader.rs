use crate::conf::error::ConfigError;
use crate::conf::types::GatewayConfig;
use crate::routing::ServerAddr;
use std::path::Path;

/// Read and validate a gateway configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let raw =
        std::fs::read_to_string(path).map_err(|source| ConfigError::read_file(path, source))?;
    let config: GatewayConfig =
        toml::from_str(&raw).map_err(|source| ConfigError::parse(path, source))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    if config.server_size == 0 {
        return Err(ConfigError::ZeroServerSize);
    }

    for pool in &config.proxy {
        // Unrecognized pool types are skipped wholesale, so their
        // contents are not held to resource-group rules.
        if !pool.is_recognized() {
            continue;
        }

        if pool.servers.is_empty() {
            return Err(ConfigError::EmptyPool {
                host: pool.host.clone(),
            });
        }

        for addr in &pool.servers {
            if ServerAddr::parse(addr).is_none() {
                return Err(ConfigError::InvalidServerAddr {
                    host: pool.host.clone(),
                    addr: addr.clone(),
                });
            }
        }
    }

    Ok(())
}
