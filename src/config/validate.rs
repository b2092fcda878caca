use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::{ConfigError, ServerConfig};

/// Startup validation per §4.1: reject invalid listen hosts and any two
/// server blocks that would collide on (host, port, server_name).
pub fn validate_configs(configs: &[ServerConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for cfg in configs {
        if Ipv4Addr::from_str(&cfg.listen_host).is_err() {
            return Err(ConfigError::InvalidHost(cfg.listen_host.clone()));
        }

        let key = (cfg.listen_host.clone(), cfg.listen_port, cfg.server_name.clone());
        if !seen.insert(key) {
            return Err(ConfigError::DuplicateVhost(
                cfg.listen_host.clone(),
                cfg.listen_port,
                cfg.server_name.clone(),
            ));
        }
    }

    Ok(())
}
