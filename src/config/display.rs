use proxy_log::info;

use super::ServerConfig;

/// One-time human-readable summary of the loaded server blocks, emitted
/// after a successful config load. Plain `info!` lines rather than an
/// ANSI dashboard, so the output stays readable in non-TTY logs.
pub fn display_config(configs: &[ServerConfig]) {
    info!("loaded {} server block(s)", configs.len());
    for cfg in configs {
        let name = if cfg.server_name.is_empty() {
            "_"
        } else {
            cfg.server_name.as_str()
        };
        info!(
            "  {}:{} server_name=\"{}\" routes={} max_body={}B{}",
            cfg.listen_host,
            cfg.listen_port,
            name,
            cfg.routes.len(),
            cfg.client_max_body_size,
            if cfg.default_server { " (default)" } else { "" }
        );
    }
}
