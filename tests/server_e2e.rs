use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mio::Poll;
use vhost_server::config::{RouteConfig, ServerConfig};
use vhost_server::server::Server;

fn unique_port(offset: u16) -> u16 {
    // Spread test ports apart so parallel `cargo test` runs don't collide.
    20000 + offset + (std::process::id() as u16 % 500) * 10
}

fn spawn_server(configs: Vec<Arc<ServerConfig>>) {
    let poll = Poll::new().unwrap();
    let server = Server::new(configs, &poll).unwrap();
    thread::spawn(move || {
        let _ = server.run(poll);
    });
    thread::sleep(Duration::from_millis(150));
}

fn send_request(port: u16, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to test server");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(raw).unwrap();
    let _ = stream.shutdown(std::net::Shutdown::Write);
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    String::from_utf8_lossy(&response).into_owned()
}

/// §8 scenario 1 & 2: static GET of an existing file, and 404 for a missing one.
#[test]
fn static_get_and_404() {
    let port = unique_port(1);
    let root = std::env::temp_dir().join(format!("vhost_e2e_static_{}", port));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("index.html"), b"hello").unwrap();

    let cfg = ServerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: port,
        routes: vec![RouteConfig {
            path: "/".to_string(),
            root: root.to_string_lossy().into_owned(),
            default_file: "index.html".to_string(),
            ..Default::default()
        }],
        default_server: true,
        client_max_body_size: 1_048_576,
        ..Default::default()
    };
    spawn_server(vec![Arc::new(cfg)]);

    let ok = send_request(port, b"GET / HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
    assert!(ok.starts_with("HTTP/1.1 200"), "unexpected response: {ok}");
    assert!(ok.contains("Content-Length: 5"));
    assert!(ok.ends_with("hello"));

    let missing = send_request(port, b"GET /missing.html HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
    assert!(missing.starts_with("HTTP/1.1 404"), "unexpected response: {missing}");

    std::fs::remove_dir_all(&root).ok();
}

/// §8 scenario 3: a location that declares `methods: ["GET"]` rejects DELETE.
#[test]
fn method_not_allowed_is_405() {
    let port = unique_port(2);
    let root = std::env::temp_dir().join(format!("vhost_e2e_405_{}", port));
    std::fs::create_dir_all(&root).unwrap();

    let cfg = ServerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: port,
        routes: vec![RouteConfig {
            path: "/foo".to_string(),
            root: root.to_string_lossy().into_owned(),
            methods: vec!["GET".to_string()],
            ..Default::default()
        }],
        default_server: true,
        client_max_body_size: 1_048_576,
        ..Default::default()
    };
    spawn_server(vec![Arc::new(cfg)]);

    let resp = send_request(port, b"DELETE /foo HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 405"), "unexpected response: {resp}");

    std::fs::remove_dir_all(&root).ok();
}

/// §8 scenario 5: a location with a redirection target issues the configured code.
#[test]
fn redirect_location_issues_301() {
    let port = unique_port(3);
    let cfg = ServerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: port,
        routes: vec![RouteConfig {
            path: "/old".to_string(),
            redirection: Some("/new".to_string()),
            redirect_code: Some(301),
            ..Default::default()
        }],
        default_server: true,
        client_max_body_size: 1_048_576,
        ..Default::default()
    };
    spawn_server(vec![Arc::new(cfg)]);

    let resp = send_request(port, b"GET /old HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 301"), "unexpected response: {resp}");
    assert!(resp.contains("Location: /new"));
    assert!(resp.contains("Content-Length: 0"));

    // Connection closes after one response, §1 Non-goals (no keep-alive).
}

/// §8 scenario 4: a multipart upload lands under `upload_path` and the
/// response is 200.
#[test]
fn multipart_upload_writes_file() {
    let port = unique_port(4);
    let upload_dir = std::env::temp_dir().join(format!("vhost_e2e_uploads_{}", port));
    std::fs::create_dir_all(&upload_dir).unwrap();

    let cfg = ServerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: port,
        routes: vec![RouteConfig {
            path: "/upload".to_string(),
            upload_dir: upload_dir.to_string_lossy().into_owned(),
            methods: vec!["POST".to_string()],
            ..Default::default()
        }],
        default_server: true,
        client_max_body_size: 1_048_576,
        ..Default::default()
    };
    spawn_server(vec![Arc::new(cfg)]);

    let body = b"--AAA\r\nContent-Disposition: form-data; name=\"f\"; filename=\"hello.txt\"\r\n\
        Content-Type: text/plain\r\n\r\nhi\r\n--AAA--\r\n";
    let mut request = format!(
        "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Type: multipart/form-data; boundary=AAA\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);

    let resp = send_request(port, &request);
    assert!(resp.starts_with("HTTP/1.1 200"), "unexpected response: {resp}");

    let saved = std::fs::read(upload_dir.join("hello.txt")).expect("uploaded file should exist");
    assert_eq!(saved, b"hi");

    std::fs::remove_dir_all(&upload_dir).ok();
}

/// §8 P1: a request split across several writes parses the same as one sent whole.
#[test]
fn fragmented_request_over_the_wire_parses_correctly() {
    let port = unique_port(5);
    let root = std::env::temp_dir().join(format!("vhost_e2e_frag_{}", port));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("index.html"), b"fragmented-ok").unwrap();

    let cfg = ServerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: port,
        routes: vec![RouteConfig {
            path: "/".to_string(),
            root: root.to_string_lossy().into_owned(),
            default_file: "index.html".to_string(),
            ..Default::default()
        }],
        default_server: true,
        client_max_body_size: 1_048_576,
        ..Default::default()
    };
    spawn_server(vec![Arc::new(cfg)]);

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    for chunk in [b"GET / HTT".as_slice(), b"P/1.1\r\nHo", b"st: 127.0.0.1\r\n", b"\r\n"] {
        stream.write_all(chunk).unwrap();
        thread::sleep(Duration::from_millis(20));
    }
    let _ = stream.shutdown(std::net::Shutdown::Write);
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200"), "unexpected response: {text}");
    assert!(text.ends_with("fragmented-ok"));

    std::fs::remove_dir_all(&root).ok();
}
