use vhost_server::config::{RouteConfig, ServerConfig};
use vhost_server::http::Method;
use vhost_server::router::RoutingError;

fn route(path: &str, methods: &[&str]) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        ..Default::default()
    }
}

fn server(routes: Vec<RouteConfig>) -> ServerConfig {
    ServerConfig { routes, ..Default::default() }
}

#[test]
fn exact_path_match_wins_over_prefix() {
    let cfg = server(vec![route("/api", &[]), route("/api/users", &[])]);
    let matched = cfg.find_route("/api/users", &Method::Get).unwrap();
    assert_eq!(matched.path, "/api/users");
}

#[test]
fn sibling_prefixes_do_not_cross_match() {
    let cfg = server(vec![route("/", &[]), route("/api", &[]), route("/apiextra", &[])]);
    let matched = cfg.find_route("/api/users", &Method::Get).unwrap();
    assert_eq!(matched.path, "/api");
}

#[test]
fn deeply_nested_locations_pick_longest() {
    let cfg = server(vec![
        route("/", &[]),
        route("/a", &[]),
        route("/a/b", &[]),
        route("/a/b/c", &[]),
    ]);
    let matched = cfg.find_route("/a/b/c/d/e", &Method::Get).unwrap();
    assert_eq!(matched.path, "/a/b/c");
}

#[test]
fn method_gating_checked_after_location_match() {
    let cfg = server(vec![route("/upload", &["POST"])]);
    assert_eq!(
        cfg.find_route("/upload", &Method::Get),
        Err(RoutingError::MethodNotAllowed)
    );
    assert!(cfg.find_route("/upload", &Method::Post).is_ok());
}

#[test]
fn no_locations_at_all_is_not_found() {
    let cfg = server(vec![]);
    assert_eq!(cfg.find_route("/", &Method::Get), Err(RoutingError::NotFound));
}

#[test]
fn status_codes_match_spec_table() {
    assert_eq!(RoutingError::NotFound.status_code(), 404);
    assert_eq!(RoutingError::MethodNotAllowed.status_code(), 405);
}
