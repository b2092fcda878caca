pub mod display;
pub mod validate;

use serde::Deserialize;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub server_name: String,
    pub client_max_body_size: usize,
    pub error_pages: HashMap<u16, String>,
    pub routes: Vec<RouteConfig>,
    pub default_server: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    pub root: String,
    pub default_file: String,
    pub autoindex: bool,
    pub upload_dir: String,
    pub cgi_ext: Vec<String>,
    pub cgi_path: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidHost(String),
    InvalidPath(String),
    MismatchedCgiLists(String),
    MalformedBodySize(String),
    InvalidErrorPageCode(String),
    DuplicateVhost(String, u16, String),
    NoServers,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read configuration file: {}", e),
            ConfigError::Json(e) => write!(f, "malformed configuration JSON: {}", e),
            ConfigError::InvalidHost(h) => write!(f, "invalid listen_host '{}', expected an IPv4 literal", h),
            ConfigError::InvalidPath(p) => write!(f, "location path '{}' must start with '/'", p),
            ConfigError::MismatchedCgiLists(p) => write!(
                f,
                "location '{}' has mismatched cgi_extension/cgi_path list lengths",
                p
            ),
            ConfigError::MalformedBodySize(s) => {
                write!(f, "malformed client_max_body_size '{}'", s)
            }
            ConfigError::InvalidErrorPageCode(s) => {
                write!(f, "invalid error_pages status code '{}'", s)
            }
            ConfigError::DuplicateVhost(host, port, name) => write!(
                f,
                "duplicate server block for {}:{} with server_name '{}'",
                host, port, name
            ),
            ConfigError::NoServers => write!(f, "configuration declares no servers"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    servers: Vec<RawServerConfig>,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    listen_host: String,
    listen_port: u16,
    #[serde(default)]
    server_name: String,
    #[serde(default = "default_body_size")]
    client_max_body_size: String,
    #[serde(default)]
    error_pages: HashMap<String, String>,
    #[serde(default)]
    locations: Vec<RawLocationConfig>,
}

#[derive(Debug, Deserialize)]
struct RawLocationConfig {
    path: String,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    root: String,
    #[serde(default)]
    index: String,
    #[serde(default)]
    autoindex: bool,
    #[serde(default)]
    redirection: String,
    #[serde(default)]
    return_code: u16,
    #[serde(default)]
    upload_path: String,
    #[serde(default)]
    cgi_extension: Vec<String>,
    #[serde(default)]
    cgi_path: Vec<String>,
}

fn default_body_size() -> String {
    "1M".to_string()
}

/// Parses the `[0-9]+[KMG]?` grammar from §6 (K/M/G are powers of 1024).
pub fn parse_body_size(input: &str) -> std::result::Result<usize, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConfigError::MalformedBodySize(input.to_string()));
    }
    let (digits, multiplier) = match input.chars().last() {
        Some('K') | Some('k') => (&input[..input.len() - 1], 1024usize),
        Some('M') | Some('m') => (&input[..input.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&input[..input.len() - 1], 1024 * 1024 * 1024),
        _ => (input, 1usize),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::MalformedBodySize(input.to_string()));
    }
    let count: usize = digits
        .parse()
        .map_err(|_| ConfigError::MalformedBodySize(input.to_string()))?;
    Ok(count * multiplier)
}

impl TryFrom<RawLocationConfig> for RouteConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLocationConfig) -> std::result::Result<Self, Self::Error> {
        if !raw.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(raw.path));
        }
        if raw.cgi_extension.len() != raw.cgi_path.len() {
            return Err(ConfigError::MismatchedCgiLists(raw.path));
        }
        Ok(RouteConfig {
            path: raw.path,
            methods: raw.methods,
            redirection: if raw.redirection.is_empty() {
                None
            } else {
                Some(raw.redirection)
            },
            redirect_code: if raw.return_code == 0 {
                None
            } else {
                Some(raw.return_code)
            },
            root: if raw.root.is_empty() {
                "./www".to_string()
            } else {
                raw.root
            },
            default_file: raw.index,
            autoindex: raw.autoindex,
            upload_dir: raw.upload_path,
            cgi_ext: raw.cgi_extension,
            cgi_path: raw.cgi_path,
        })
    }
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServerConfig) -> std::result::Result<Self, Self::Error> {
        let client_max_body_size = parse_body_size(&raw.client_max_body_size)?;

        let mut error_pages = HashMap::new();
        for (code, path) in raw.error_pages {
            let code: u16 = code
                .parse()
                .map_err(|_| ConfigError::InvalidErrorPageCode(code.clone()))?;
            error_pages.insert(code, path);
        }

        let mut routes = Vec::with_capacity(raw.locations.len());
        for loc in raw.locations {
            routes.push(RouteConfig::try_from(loc)?);
        }

        Ok(ServerConfig {
            listen_host: raw.listen_host,
            listen_port: raw.listen_port,
            server_name: raw.server_name,
            client_max_body_size,
            error_pages,
            routes,
            default_server: false,
        })
    }
}

/// Loads, converts, and validates the JSON configuration file named on the
/// command line into the immutable tree the engine runs against.
pub fn load_configs(path: &Path) -> Result<Vec<Arc<ServerConfig>>> {
    let text = std::fs::read_to_string(path).map_err(ConfigError::from)?;
    let raw: RawConfigFile = serde_json::from_str(&text).map_err(ConfigError::from)?;

    if raw.servers.is_empty() {
        return Err(ConfigError::NoServers.into());
    }

    let mut configs = Vec::with_capacity(raw.servers.len());
    for raw_server in raw.servers {
        configs.push(ServerConfig::try_from(raw_server)?);
    }

    validate::validate_configs(&configs)?;

    // first config seen for a given (host, port) is the default vhost, §4.1.
    let mut seen_endpoints = std::collections::HashSet::new();
    for cfg in configs.iter_mut() {
        let endpoint = (cfg.listen_host.clone(), cfg.listen_port);
        if seen_endpoints.insert(endpoint) {
            cfg.default_server = true;
        }
    }

    Ok(configs.into_iter().map(Arc::new).collect())
}
