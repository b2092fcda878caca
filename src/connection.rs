use crate::prelude::*;

/// What remains to be pushed onto the socket after the response headers (and,
/// for everything but GET, the body) have already been queued into
/// `write_buffer`.
#[derive(Debug)]
pub enum ActiveAction {
    FileDownload(File, usize),
    None,
}

/// One TCP connection. Per §4.2 there is no keep-alive and no pipelining: a
/// `Connection` parses exactly one request, writes exactly one response, and
/// is then torn down — so this struct carries no notion of "next request".
pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub write_buffer: Vec<u8>,
    pub request: HttpRequest,
    pub config_list: Vec<Arc<ServerConfig>>,
    pub s_cfg: Option<Arc<ServerConfig>>,
    pub action: ActiveAction,
    pub closed: bool,
    pub responded: bool,
    pub is_head: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, config_list: Vec<Arc<ServerConfig>>) -> Self {
        Connection {
            stream,
            peer_addr,
            write_buffer: Vec::new(),
            request: HttpRequest::new(),
            config_list,
            s_cfg: None,
            action: ActiveAction::None,
            closed: false,
            responded: false,
            is_head: false,
        }
    }

    pub fn should_close(&self) -> bool {
        self.closed && self.write_buffer.is_empty() && !matches!(self.action, ActiveAction::FileDownload(..))
    }

    /// Once headers/body are fully parsed and dispatched the response sits in
    /// `write_buffer` (or is still being streamed from a `FileDownload`); the
    /// event loop should watch for writability instead of readability.
    pub fn wants_write(&self) -> bool {
        self.responded && (!self.write_buffer.is_empty() || matches!(self.action, ActiveAction::FileDownload(..)))
    }

    /// §4.1 vhost selection: exact `server_name` match on this listener's
    /// configs, else the one flagged `default_server`, else the first one.
    fn resolve_config(&mut self) {
        if self.s_cfg.is_some() {
            return;
        }
        if let Some(hostname) = self.request.host() {
            if let Some(cfg) = self.config_list.iter().find(|c| c.server_name == hostname) {
                self.s_cfg = Some(Arc::clone(cfg));
                return;
            }
        }
        if let Some(cfg) = self.config_list.iter().find(|c| c.default_server) {
            self.s_cfg = Some(Arc::clone(cfg));
            return;
        }
        self.s_cfg = self.config_list.first().cloned();
    }

    /// Drains the socket into the request buffer. Returns true on EOF/error.
    pub fn read_data(&mut self) -> bool {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return true,
                Ok(n) => self.request.buffer.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(_) => return true,
            }
        }
    }

    /// Flushes as much of `write_buffer` as the socket accepts without blocking.
    pub fn write_data(&mut self) -> bool {
        match self.stream.write(&self.write_buffer) {
            Ok(0) => false,
            Ok(n) => {
                self.write_buffer.drain(..n);
                false
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => true,
        }
    }

    pub fn on_readable(&mut self) {
        if self.read_data() {
            self.closed = true;
        }
        if !self.responded {
            self.drive_parse();
        }
    }

    /// Flushes queued bytes, then streams the next chunk of a `FileDownload`
    /// body (if any) into `write_buffer` so the next write pass can pick it
    /// up. Bodies are never fully buffered up front, §4.5.
    pub fn on_writable(&mut self) {
        if self.write_data() {
            self.closed = true;
            self.action = ActiveAction::None;
            return;
        }
        if self.write_buffer.is_empty() {
            if let ActiveAction::FileDownload(file, remaining) = &mut self.action {
                if *remaining == 0 {
                    self.action = ActiveAction::None;
                    return;
                }
                let mut chunk = [0u8; READ_BUF_SIZE];
                let to_read = std::cmp::min(chunk.len(), *remaining);
                match file.read(&mut chunk[..to_read]) {
                    Ok(0) => self.action = ActiveAction::None,
                    Ok(n) => {
                        self.write_buffer.extend_from_slice(&chunk[..n]);
                        *remaining -= n;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(_) => self.action = ActiveAction::None,
                }
            }
        }
    }

    /// Pushes the parser as far as possible, recomputing the body-size cap
    /// once the vhost is known (see `HttpRequest::advance`'s doc comment).
    fn drive_parse(&mut self) {
        loop {
            let cap = self.s_cfg.as_ref().map(|c| c.client_max_body_size).unwrap_or(usize::MAX);
            match self.request.advance(cap) {
                Err(ParseError::Incomplete) => return,
                Err(e) => {
                    self.fail(e.status_code());
                    return;
                }
                Ok(()) => {
                    let cfg_is_new = self.s_cfg.is_none();
                    if cfg_is_new {
                        self.resolve_config();
                        if let Some(s_cfg) = self.s_cfg.clone() {
                            if !self.request.is_chunked && self.request.content_length > s_cfg.client_max_body_size {
                                self.fail(HTTP_PAYLOAD_TOO_LARGE);
                                return;
                            }
                        }
                        if self.request.state != ParsingState::Complete {
                            // Re-enter the loop with the now-correct cap.
                            continue;
                        }
                    }
                    if self.request.state == ParsingState::Complete {
                        self.dispatch();
                    }
                    return;
                }
            }
        }
    }

    fn fail(&mut self, code: u16) {
        let response = HttpResponse::handle_error(code, self.s_cfg.as_ref());
        self.set_response(response);
        self.closed = true;
    }

    fn set_response(&mut self, response: HttpResponse) {
        let owned_name;
        let server_name = match self.s_cfg.as_ref().map(|c| c.server_name.as_str()) {
            Some(name) if !name.is_empty() => name,
            _ => {
                owned_name = "vhost_server".to_string();
                owned_name.as_str()
            }
        };
        self.write_buffer = if self.is_head {
            response.to_bytes_headers_only(server_name)
        } else {
            match self.action {
                ActiveAction::FileDownload(..) => response.to_bytes_headers_only(server_name),
                ActiveAction::None => response.to_bytes(server_name),
            }
        };
        self.responded = true;
    }

    /// §4.4-§4.8: resolve the route, apply redirects, dispatch to CGI or a
    /// handler. Always closes afterward per the no-keep-alive Non-goal.
    fn dispatch(&mut self) {
        self.resolve_config();
        let Some(s_cfg) = self.s_cfg.clone() else {
            self.closed = true;
            return;
        };

        if self.request.needs_redirect {
            let target = self.request.normalized_target();
            self.set_response(HttpResponse::redirect(HTTP_MOVED_PERMANENTLY, &target));
            self.closed = true;
            return;
        }

        self.is_head = self.request.method == Method::Head;
        let lookup_method = if self.is_head { Method::Get } else { self.request.method.clone() };

        let route = match s_cfg.find_route(&self.request.path, &lookup_method) {
            Ok(r) => r.clone(),
            Err(e) => {
                self.set_response(HttpResponse::handle_error(e.status_code(), Some(&s_cfg)));
                self.closed = true;
                return;
            }
        };

        if let Some(target) = route.redirection.clone() {
            let code = route.redirect_code.unwrap_or(HTTP_FOUND);
            self.set_response(HttpResponse::redirect(code, &target));
            self.closed = true;
            return;
        }

        if let Some(interpreter) = resolve_cgi_interpreter(&self.request.path, &route) {
            self.run_cgi_action(&route, &interpreter, &s_cfg);
            self.closed = true;
            return;
        }

        match lookup_method {
            Method::Get => {
                let (response, action) = handle_get(&self.request, &route, &s_cfg);
                self.action = action;
                self.set_response(response);
            }
            Method::Post => {
                let response = handle_post(&self.request, &route, &s_cfg);
                self.set_response(response);
            }
            Method::Delete => {
                let response = handle_delete(&self.request, &route, &s_cfg);
                self.set_response(response);
            }
            _ => {
                self.set_response(HttpResponse::handle_error(HTTP_METHOD_NOT_ALLOWED, Some(&s_cfg)));
            }
        }
        self.closed = true;
    }

    fn run_cgi_action(&mut self, route: &RouteConfig, interpreter: &str, s_cfg: &Arc<ServerConfig>) {
        let relative = self.request.path.strip_prefix(&route.path).unwrap_or(&self.request.path);
        let mut script_path = PathBuf::from(&route.root);
        script_path.push(relative.trim_start_matches('/'));

        match run_cgi(interpreter, &script_path, &self.request, s_cfg, self.peer_addr) {
            Ok(output) => {
                let mut response = HttpResponse::new(output.status);
                for (key, value) in output.headers {
                    response = response.set_header(&key, &value);
                }
                response = response.set_body(output.body);
                self.set_response(response);
            }
            Err(CgiError::Timeout) => {
                self.set_response(HttpResponse::handle_error(HTTP_GATEWAY_TIMEOUT, Some(s_cfg)));
            }
            Err(CgiError::Io(_)) | Err(CgiError::NonZeroExit(_)) => {
                self.set_response(HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)));
            }
        }
    }
}

/// Matches the request path's extension against a location's `cgi_ext` list,
/// returning the paired interpreter path if there's a hit, §4.8 step 1.
fn resolve_cgi_interpreter(path: &str, route: &RouteConfig) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?;
    route
        .cgi_ext
        .iter()
        .position(|candidate| candidate.trim_start_matches('.') == ext)
        .map(|i| route.cgi_path[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(ext: &[&str], interpreters: &[&str]) -> RouteConfig {
        RouteConfig {
            cgi_ext: ext.iter().map(|s| s.to_string()).collect(),
            cgi_path: interpreters.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn cgi_interpreter_matched_by_extension() {
        let r = route(&["py", "php"], &["/usr/bin/python3", "/usr/bin/php-cgi"]);
        assert_eq!(resolve_cgi_interpreter("/cgi-bin/a.py", &r).as_deref(), Some("/usr/bin/python3"));
        assert_eq!(resolve_cgi_interpreter("/cgi-bin/a.php", &r).as_deref(), Some("/usr/bin/php-cgi"));
        assert_eq!(resolve_cgi_interpreter("/cgi-bin/a.html", &r), None);
    }
}
