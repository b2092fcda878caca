use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::NotFound => write!(f, "no location matches the request path"),
            RoutingError::MethodNotAllowed => write!(f, "method not allowed for matched location"),
        }
    }
}

impl std::error::Error for RoutingError {}

impl RoutingError {
    pub fn status_code(&self) -> u16 {
        match self {
            RoutingError::NotFound => HTTP_NOT_FOUND,
            RoutingError::MethodNotAllowed => HTTP_METHOD_NOT_ALLOWED,
        }
    }
}

impl ServerConfig {
    /// Longest-prefix location match (§4.4 P4), then method gating (P5).
    pub fn find_route(&self, path: &str, method: &Method) -> std::result::Result<&RouteConfig, RoutingError> {
        let matched = self
            .routes
            .iter()
            .filter(|r| path == r.path || path.starts_with(&format!("{}/", r.path.trim_end_matches('/'))) || r.path == "/")
            .max_by_key(|r| r.path.len())
            .ok_or(RoutingError::NotFound)?;

        if method.is_allowed(&matched.methods) {
            Ok(matched)
        } else {
            Err(RoutingError::MethodNotAllowed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str, methods: &[&str]) -> RouteConfig {
        RouteConfig {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    fn server(routes: Vec<RouteConfig>) -> ServerConfig {
        ServerConfig {
            routes,
            ..Default::default()
        }
    }

    #[test]
    fn picks_longest_matching_prefix() {
        let cfg = server(vec![route("/", &[]), route("/api", &[]), route("/api/v2", &[])]);
        let matched = cfg.find_route("/api/v2/users", &Method::Get).unwrap();
        assert_eq!(matched.path, "/api/v2");
    }

    #[test]
    fn falls_back_to_root() {
        let cfg = server(vec![route("/", &[]), route("/api", &[])]);
        let matched = cfg.find_route("/elsewhere", &Method::Get).unwrap();
        assert_eq!(matched.path, "/");
    }

    #[test]
    fn no_match_is_not_found() {
        let cfg = server(vec![route("/api", &[])]);
        assert_eq!(cfg.find_route("/other", &Method::Get), Err(RoutingError::NotFound));
    }

    #[test]
    fn disallowed_method_is_rejected() {
        let cfg = server(vec![route("/api", &["GET"])]);
        assert_eq!(
            cfg.find_route("/api", &Method::Post),
            Err(RoutingError::MethodNotAllowed)
        );
    }

    #[test]
    fn empty_methods_allows_everything() {
        let cfg = server(vec![route("/api", &[])]);
        assert!(cfg.find_route("/api", &Method::Delete).is_ok());
    }
}
