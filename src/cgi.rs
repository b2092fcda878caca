use crate::prelude::*;
use std::os::unix::net::UnixStream;
use std::process::Stdio;

pub struct CgiOutput {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum CgiError {
    Timeout,
    Io(std::io::Error),
    NonZeroExit(std::process::ExitStatus),
}

impl fmt::Display for CgiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CgiError::Timeout => write!(f, "CGI process exceeded {}s timeout", CGI_TIMEOUT.as_secs()),
            CgiError::Io(e) => write!(f, "CGI I/O error: {}", e),
            CgiError::NonZeroExit(status) => write!(f, "CGI process exited with {}", status),
        }
    }
}

impl std::error::Error for CgiError {}

impl From<std::io::Error> for CgiError {
    fn from(e: std::io::Error) -> Self {
        CgiError::Io(e)
    }
}

/// Splits CGI output on the header/body separator and reads an optional
/// `Status:` line, §4.8 step 4.
pub fn parse_cgi_output(raw_output: &[u8]) -> CgiOutput {
    let header_end = find_subsequence(raw_output, b"\r\n\r\n", 0).unwrap_or(raw_output.len());
    let body_start = std::cmp::min(header_end + 4, raw_output.len());
    let header_section = String::from_utf8_lossy(&raw_output[..header_end]);
    let body = raw_output[body_start..].to_vec();

    let mut status = HTTP_OK;
    let mut headers = Vec::new();
    for line in header_section.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        if key == "status" {
            status = value.split_whitespace().next().and_then(|s| s.parse().ok()).unwrap_or(HTTP_OK);
        } else {
            headers.push((key, value));
        }
    }

    CgiOutput { status, headers, body }
}

fn build_cgi_env(
    request: &HttpRequest,
    s_cfg: &ServerConfig,
    script_path: &Path,
    peer_addr: SocketAddr,
) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("REQUEST_METHOD".to_string(), request.method.to_string());
    env.insert("CONTENT_LENGTH".to_string(), request.body.len().to_string());
    env.insert("SCRIPT_NAME".to_string(), script_path.to_string_lossy().into_owned());
    env.insert("QUERY_STRING".to_string(), request.query_string.clone());
    env.insert(
        "CONTENT_TYPE".to_string(),
        request.headers.get("content-type").cloned().unwrap_or_default(),
    );
    env.insert("PATH_INFO".to_string(), request.path.clone());
    env.insert("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string());
    env.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    env.insert("SERVER_SOFTWARE".to_string(), "vhost_server/0.1".to_string());
    env.insert(
        "SERVER_NAME".to_string(),
        if s_cfg.server_name.is_empty() { "_".to_string() } else { s_cfg.server_name.clone() },
    );
    env.insert("SERVER_PORT".to_string(), s_cfg.listen_port.to_string());
    env.insert("REMOTE_ADDR".to_string(), peer_addr.ip().to_string());
    env
}

/// Runs a CGI script to completion: fork/exec, pipe the buffered request body
/// in, drain stdout, and enforce a wall-clock deadline with SIGKILL (§4.8, §4.9).
///
/// Connections are single-use and CGI scripts here run synchronously rather
/// than interleaved with the event loop, so plain non-registered
/// `UnixStream` pairs are enough: nothing else needs to run while we wait.
pub fn run_cgi(
    interpreter: &str,
    script_path: &Path,
    request: &HttpRequest,
    s_cfg: &ServerConfig,
    peer_addr: SocketAddr,
) -> std::result::Result<CgiOutput, CgiError> {
    let (mut stdin_parent, stdin_child) = UnixStream::pair()?;
    let (stdout_child, mut stdout_parent) = UnixStream::pair()?;

    let mut child = Command::new(interpreter)
        .arg(script_path)
        .envs(build_cgi_env(request, s_cfg, script_path, peer_addr))
        .stdin(Stdio::from(stdin_child))
        .stdout(Stdio::from(stdout_child))
        .stderr(Stdio::null())
        .spawn()?;

    stdin_parent.set_nonblocking(true)?;
    stdout_parent.set_nonblocking(true)?;

    let deadline = Instant::now() + CGI_TIMEOUT;
    let mut write_pos = 0usize;
    let mut output = Vec::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut stdin_open = true;

    loop {
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CgiError::Timeout);
        }

        let mut made_progress = false;

        if stdin_open {
            if write_pos < request.body.len() {
                match stdin_parent.write(&request.body[write_pos..]) {
                    Ok(n) => {
                        write_pos += n;
                        made_progress = true;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
            if write_pos == request.body.len() {
                let _ = stdin_parent.shutdown(std::net::Shutdown::Write);
                stdin_open = false;
            }
        }

        match stdout_parent.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                output.extend_from_slice(&buf[..n]);
                made_progress = true;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        if let Ok(Some(status)) = child.try_wait() {
            loop {
                match stdout_parent.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => output.extend_from_slice(&buf[..n]),
                    Err(_) => break,
                }
            }
            if !status.success() {
                return Err(CgiError::NonZeroExit(status));
            }
            return Ok(parse_cgi_output(&output));
        }

        if !made_progress {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    // stdout hit EOF; the child may not have been reaped by try_wait() yet.
    let status = child.wait()?;
    if !status.success() {
        return Err(CgiError::NonZeroExit(status));
    }
    Ok(parse_cgi_output(&output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line_and_splits_body() {
        let raw = b"Status: 404 Not Found\r\nContent-Type: text/plain\r\n\r\nnot here";
        let out = parse_cgi_output(raw);
        assert_eq!(out.status, 404);
        assert_eq!(out.body, b"not here");
        assert!(out.headers.iter().any(|(k, v)| k == "content-type" && v == "text/plain"));
    }

    #[test]
    fn defaults_to_200_without_status_header() {
        let raw = b"Content-Type: text/html\r\n\r\n<p>hi</p>";
        let out = parse_cgi_output(raw);
        assert_eq!(out.status, 200);
    }

    #[test]
    fn cgi_script_output_is_captured() {
        let file_path = std::env::temp_dir().join(format!("cgi_test_{}.txt", std::process::id()));
        fs::write(&file_path, b"Content-Type: text/plain\r\n\r\nping").unwrap();

        let mut req = HttpRequest::new();
        req.method = Method::Post;
        req.path = "/cgi-bin/echo".to_string();
        let cfg = ServerConfig {
            listen_port: 8080,
            ..Default::default()
        };
        let peer = "127.0.0.1:9999".parse().unwrap();
        let result = run_cgi("/bin/cat", &file_path, &req, &cfg, peer);
        fs::remove_file(&file_path).ok();

        let out = result.unwrap();
        assert_eq!(out.status, 200);
        assert_eq!(out.body, b"ping");
    }

    #[test]
    fn non_zero_exit_is_reported_as_an_error() {
        let script_path = std::env::temp_dir().join(format!("cgi_fail_{}.sh", std::process::id()));
        fs::write(&script_path, b"#!/bin/sh\nexit 1\n").unwrap();

        let req = HttpRequest::new();
        let cfg = ServerConfig {
            listen_port: 8080,
            ..Default::default()
        };
        let peer = "127.0.0.1:9999".parse().unwrap();
        let result = run_cgi("/bin/sh", &script_path, &req, &cfg, peer);
        fs::remove_file(&script_path).ok();

        assert!(matches!(result, Err(CgiError::NonZeroExit(_))));
    }
}
