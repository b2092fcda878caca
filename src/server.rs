use crate::prelude::*;

/// One socket per distinct `(listen_host, listen_port)` pair, shared by every
/// `ServerConfig` bound to it — virtual hosting is resolved per-request from
/// this list once the `Host` header is known, §4.1.
struct Listener {
    socket: TcpListener,
    config_list: Vec<Arc<ServerConfig>>,
}

/// The readiness-based event loop: one `mio::Poll` driving however many
/// listening sockets the configuration declares, plus the live connection
/// table. There is no worker pool and no keep-alive (§4.2) so a connection's
/// lifetime is exactly one accept → one request → one response → close.
pub struct Server {
    listeners: HashMap<Token, Listener>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Server {
    pub fn new(configs: Vec<Arc<ServerConfig>>, poll: &Poll) -> Result<Self> {
        let mut grouped: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();
        for cfg in configs {
            grouped.entry((cfg.listen_host.clone(), cfg.listen_port)).or_default().push(cfg);
        }

        let mut listeners = HashMap::new();
        let mut next_token = 0usize;
        for ((host, port), config_list) in grouped {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .map_err(|_| crate::error::CleanError::from(format!("invalid listen address {}:{}", host, port)))?;
            let mut socket = TcpListener::bind(addr)?;
            let token = Token(next_token);
            next_token += 1;
            poll.registry().register(&mut socket, token, Interest::READABLE)?;
            info!("listening on {}:{} ({} vhost(s))", host, port, config_list.len());
            listeners.insert(token, Listener { socket, config_list });
        }

        Ok(Server { listeners, connections: HashMap::new(), next_token })
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn run(mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            poll.poll(&mut events, Some(Duration::from_millis(500)))?;

            let ready: Vec<(Token, bool, bool)> =
                events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();
            for (token, readable, writable) in ready {
                if self.listeners.contains_key(&token) {
                    self.accept_connections(token, &poll);
                    continue;
                }
                self.service(token, readable, writable, &poll);
            }
        }
    }

    fn accept_connections(&mut self, token: Token, poll: &Poll) {
        loop {
            let Some(listener) = self.listeners.get_mut(&token) else { return };
            let (mut stream, peer_addr) = match listener.socket.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    errors!("accept failed: {}", e);
                    return;
                }
            };
            let config_list = listener.config_list.clone();
            let conn_token = self.alloc_token();
            if let Err(e) = poll.registry().register(&mut stream, conn_token, Interest::READABLE) {
                errors!("failed to register connection: {}", e);
                continue;
            }
            self.connections.insert(conn_token, Connection::new(stream, peer_addr, config_list));
        }
    }

    fn service(&mut self, token: Token, readable: bool, writable: bool, poll: &Poll) {
        let Some(conn) = self.connections.get_mut(&token) else { return };

        if readable {
            conn.on_readable();
        }
        if writable || conn.wants_write() {
            conn.on_writable();
        }

        if conn.should_close() {
            self.close(token, poll);
            return;
        }

        let interest = if conn.wants_write() { Interest::WRITABLE } else { Interest::READABLE };
        if let Some(conn) = self.connections.get_mut(&token) {
            let _ = poll.registry().reregister(&mut conn.stream, token, interest);
        }
    }

    fn close(&mut self, token: Token, poll: &Poll) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = poll.registry().deregister(&mut conn.stream);
            let _ = conn.stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
