use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
    Head,
    Other(String),
}

impl Method {
    /// Empty `allowed` means "any method is allowed" per §3's LocationConfig invariant.
    pub fn is_allowed(&self, allowed: &[String]) -> bool {
        if allowed.is_empty() {
            return true;
        }
        allowed.iter().any(|m| m.eq_ignore_ascii_case(self.as_str()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Other(s) => s.as_str(),
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ParseError::MalformedRequestLine);
        }
        Ok(match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            other => Method::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    HeadersDone,
    Body,
    ChunkedBody,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not a framing error: the buffer simply doesn't hold a full unit yet.
    Incomplete,
    MalformedRequestLine,
    InvalidMethod,
    HeaderTooLong,
    InvalidHeaderLine,
    InvalidChunkSize,
    PayloadTooLarge,
    PathTraversal,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => write!(f, "incomplete request"),
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidMethod => write!(f, "invalid method"),
            ParseError::HeaderTooLong => write!(f, "header block exceeds cap"),
            ParseError::InvalidHeaderLine => write!(f, "invalid header line"),
            ParseError::InvalidChunkSize => write!(f, "invalid chunk size"),
            ParseError::PayloadTooLarge => write!(f, "payload exceeds client_max_body_size"),
            ParseError::PathTraversal => write!(f, "path traversal in request target"),
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    /// Maps a framing failure to the status code the Responder boundary emits, §4.9.
    pub fn status_code(&self) -> u16 {
        match self {
            ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
            ParseError::HeaderTooLong => HTTP_URI_TOO_LONG,
            ParseError::InvalidMethod => HTTP_BAD_REQUEST,
            _ => HTTP_BAD_REQUEST,
        }
    }
}

const CRLF_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkState {
    ReadSize,
    ReadData(usize),
    ReadTrailingCrlf,
    ReadTrailers,
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query_string: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub needs_redirect: bool,
    pub content_length: usize,
    pub is_chunked: bool,
    pub buffer: Vec<u8>,
    pub cursor: usize,
    pub state: ParsingState,
    pub chunk_state: ChunkState,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::Get,
            path: String::new(),
            query_string: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            needs_redirect: false,
            content_length: 0,
            is_chunked: false,
            buffer: Vec::with_capacity(READ_BUF_SIZE),
            cursor: 0,
            state: ParsingState::RequestLine,
            chunk_state: ChunkState::ReadSize,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get("host").map(|h| h.split(':').next().unwrap_or(h))
    }

    /// Normalized target including a re-attached query string, used for the
    /// `Location` header of a trailing-slash 301 (§4.4, §8 P7).
    pub fn normalized_target(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }

    fn parse_request_line(&mut self) -> std::result::Result<(), ParseError> {
        if self.buffer.len() > HEADER_CAP && find_crlf(&self.buffer, 0).is_none() {
            return Err(ParseError::HeaderTooLong);
        }
        let Some(abs_index) = find_crlf(&self.buffer, self.cursor) else {
            return Err(ParseError::Incomplete);
        };
        let line_bytes = &self.buffer[self.cursor..abs_index];
        let line = std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::MalformedRequestLine);
        }

        self.method = Method::from_str(parts[0]).map_err(|_| ParseError::InvalidMethod)?;

        let target = parts[1];
        let (raw_path, query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        if raw_path.split('/').any(|segment| segment == "..") {
            return Err(ParseError::PathTraversal);
        }

        let (path, needs_redirect) = if raw_path.len() > 1 && raw_path.ends_with('/') {
            (raw_path.trim_end_matches('/').to_string(), true)
        } else {
            (raw_path.to_string(), false)
        };

        self.path = if path.is_empty() { "/".to_string() } else { path };
        self.query_string = query.to_string();
        self.needs_redirect = needs_redirect;
        self.version = if parts[2].starts_with("HTTP/") {
            parts[2].to_string()
        } else {
            "HTTP/1.1".to_string()
        };

        self.cursor = abs_index + CRLF_LEN;
        self.state = ParsingState::Headers;
        Ok(())
    }

    fn extract_header_line(&mut self) -> std::result::Result<Option<(String, String)>, ParseError> {
        let Some(abs_index) = find_crlf(&self.buffer, self.cursor) else {
            return Err(ParseError::Incomplete);
        };
        let line_bytes = &self.buffer[self.cursor..abs_index];
        if line_bytes.is_empty() {
            self.cursor = abs_index + CRLF_LEN;
            return Ok(None);
        }
        let line = std::str::from_utf8(line_bytes).map_err(|_| ParseError::InvalidHeaderLine)?;
        self.cursor = abs_index + CRLF_LEN;

        let Some(sep) = line.find(':') else {
            return Err(ParseError::InvalidHeaderLine);
        };
        let key = line[..sep].trim().to_ascii_lowercase();
        let value = line[sep + 1..].trim().to_string();
        Ok(Some((key, value)))
    }

    fn parse_headers(&mut self) -> std::result::Result<(), ParseError> {
        loop {
            if self.cursor > HEADER_CAP {
                return Err(ParseError::HeaderTooLong);
            }
            match self.extract_header_line()? {
                Some((k, v)) => {
                    self.headers.insert(k, v);
                }
                None => {
                    self.buffer.drain(..self.cursor);
                    self.cursor = 0;
                    self.state = ParsingState::HeadersDone;
                    return Ok(());
                }
            }
        }
    }

    /// Derives content_length/is_chunked and advances past headers, §4.3 ReadingHeaders → ReadingBody.
    fn finish_headers(&mut self, max_body: usize) -> std::result::Result<(), ParseError> {
        self.is_chunked = self
            .headers
            .get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        if !self.is_chunked {
            self.content_length = match self.headers.get("content-length") {
                Some(v) => v.trim().parse().map_err(|_| ParseError::MalformedRequestLine)?,
                None => 0,
            };
            if self.content_length > max_body {
                return Err(ParseError::PayloadTooLarge);
            }
        }

        self.state = if self.is_chunked {
            ParsingState::ChunkedBody
        } else if self.content_length > 0 {
            ParsingState::Body
        } else {
            ParsingState::Complete
        };
        Ok(())
    }

    fn parse_body(&mut self, max_body: usize) -> std::result::Result<(), ParseError> {
        let available = self.buffer.len() - self.cursor;
        let remaining = self.content_length - self.body.len();
        let to_take = std::cmp::min(available, remaining);

        if to_take > 0 {
            self.body
                .extend_from_slice(&self.buffer[self.cursor..self.cursor + to_take]);
            self.buffer.drain(..self.cursor + to_take);
            self.cursor = 0;
        }

        if self.body.len() > max_body {
            return Err(ParseError::PayloadTooLarge);
        }
        if self.body.len() == self.content_length {
            self.state = ParsingState::Complete;
            Ok(())
        } else {
            Err(ParseError::Incomplete)
        }
    }

    /// Decodes chunked framing directly into `self.body`; trailers are parsed but
    /// discarded, per the open question in §9.
    fn parse_chunked_body(&mut self, max_body: usize) -> std::result::Result<(), ParseError> {
        loop {
            match self.chunk_state {
                ChunkState::ReadSize => {
                    let search_limit = std::cmp::min(self.buffer.len(), 32);
                    match find_subsequence(&self.buffer[..search_limit], b"\r\n", 0) {
                        Some(line_end) => {
                            let hex = String::from_utf8_lossy(&self.buffer[..line_end]);
                            let hex = hex.split(';').next().unwrap_or("").trim();
                            let size = usize::from_str_radix(hex, 16)
                                .map_err(|_| ParseError::InvalidChunkSize)?;

                            if self.body.len() + size > max_body {
                                return Err(ParseError::PayloadTooLarge);
                            }

                            if size == 0 {
                                self.buffer.drain(..line_end + CRLF_LEN);
                                self.chunk_state = ChunkState::ReadTrailers;
                            } else {
                                self.buffer.drain(..line_end + CRLF_LEN);
                                self.chunk_state = ChunkState::ReadData(size);
                            }
                        }
                        None => {
                            if self.buffer.len() >= 32 {
                                return Err(ParseError::InvalidChunkSize);
                            }
                            return Err(ParseError::Incomplete);
                        }
                    }
                }
                ChunkState::ReadData(remaining) => {
                    if self.buffer.is_empty() {
                        return Err(ParseError::Incomplete);
                    }
                    let to_take = std::cmp::min(self.buffer.len(), remaining);
                    let data: Vec<u8> = self.buffer.drain(..to_take).collect();
                    self.body.extend_from_slice(&data);

                    let left = remaining - to_take;
                    if left == 0 {
                        self.chunk_state = ChunkState::ReadTrailingCrlf;
                    } else {
                        self.chunk_state = ChunkState::ReadData(left);
                        return Err(ParseError::Incomplete);
                    }
                }
                ChunkState::ReadTrailingCrlf => {
                    if self.buffer.len() < CRLF_LEN {
                        return Err(ParseError::Incomplete);
                    }
                    if &self.buffer[..CRLF_LEN] != b"\r\n" {
                        return Err(ParseError::InvalidChunkSize);
                    }
                    self.buffer.drain(..CRLF_LEN);
                    self.chunk_state = ChunkState::ReadSize;
                }
                ChunkState::ReadTrailers => match self.extract_header_line() {
                    Ok(Some(_)) => continue, // discarded, §9 open question
                    Ok(None) => {
                        self.buffer.drain(..self.cursor);
                        self.cursor = 0;
                        self.state = ParsingState::Complete;
                        return Ok(());
                    }
                    Err(ParseError::Incomplete) => return Err(ParseError::Incomplete),
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// Drives the state machine as far as the current buffer allows, using
    /// `max_body` to cap Content-Length/chunked bodies.
    ///
    /// Returns as soon as headers finish parsing (state becomes `Body`,
    /// `ChunkedBody`, or `Complete`) rather than looping straight through to
    /// `Complete` in one call: the caller doesn't know which vhost's
    /// `client_max_body_size` applies until it has read the `Host` header, so
    /// it needs the chance to recompute `max_body` before any body bytes are
    /// buffered against the wrong cap.
    pub fn advance(&mut self, max_body: usize) -> std::result::Result<(), ParseError> {
        loop {
            match self.state {
                ParsingState::RequestLine => self.parse_request_line()?,
                ParsingState::Headers => self.parse_headers()?,
                ParsingState::HeadersDone => {
                    self.finish_headers(max_body)?;
                    return Ok(());
                }
                ParsingState::Body => self.parse_body(max_body)?,
                ParsingState::ChunkedBody => self.parse_chunked_body(max_body)?,
                ParsingState::Complete => return Ok(()),
            }
        }
    }
}

pub fn find_crlf(buffer: &[u8], start_offset: usize) -> Option<usize> {
    find_subsequence(buffer, b"\r\n", start_offset)
}

pub fn find_subsequence(buffer: &[u8], needle: &[u8], start_offset: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let search_area = buffer.get(start_offset..)?;
    let first_byte = needle[0];
    let mut pos = 0;

    while let Some(rel) = search_area[pos..].iter().position(|&b| b == first_byte) {
        let abs = pos + rel;
        match search_area.get(abs..abs + needle.len()) {
            Some(candidate) if candidate == needle => return Some(start_offset + abs),
            Some(_) => {}
            None => return None,
        }
        pos = abs + 1;
    }
    None
}

#[derive(Debug, Default, Clone)]
pub struct PartInfo {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
}

pub fn parse_part_headers(headers: &str) -> PartInfo {
    let mut info = PartInfo::default();

    for line in headers.lines() {
        if line.to_ascii_lowercase().starts_with("content-disposition:") {
            if let Some(n) = line.split(';').find(|s| s.trim().starts_with("name=")) {
                info.name = n.split('=').nth(1).unwrap_or("").trim_matches('"').to_string();
            }
            if let Some(fnm) = line.split(';').find(|s| s.trim().starts_with("filename=")) {
                info.filename = Some(
                    fnm.split('=')
                        .nth(1)
                        .unwrap_or("")
                        .trim_matches('"')
                        .to_string(),
                );
            }
        } else if line.to_ascii_lowercase().starts_with("content-type:") {
            info.content_type = line.split(':').nth(1).unwrap_or("text/plain").trim().to_string();
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_fully(bytes: &[u8]) -> HttpRequest {
        let mut req = HttpRequest::new();
        req.buffer.extend_from_slice(bytes);
        while req.state != ParsingState::Complete {
            req.advance(1_048_576).unwrap();
        }
        req
    }

    #[test]
    fn simple_get_request() {
        let req = parse_fully(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.state, ParsingState::Complete);
        assert_eq!(req.headers.get("host").unwrap(), "localhost");
    }

    #[test]
    fn fragmented_request_yields_same_result_as_whole() {
        let whole = b"POST /api HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut fragmented = HttpRequest::new();
        for byte in whole {
            fragmented.buffer.push(*byte);
            match fragmented.advance(1_048_576) {
                Ok(()) if fragmented.state == ParsingState::Complete => break,
                Ok(()) => continue,
                Err(ParseError::Incomplete) => continue,
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }
        let whole_parsed = parse_fully(whole);
        assert_eq!(fragmented.method, whole_parsed.method);
        assert_eq!(fragmented.path, whole_parsed.path);
        assert_eq!(fragmented.body, whole_parsed.body);
    }

    #[test]
    fn chunked_body_decodes_to_original_bytes() {
        let raw = b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let req = parse_fully(raw);
        assert_eq!(req.body, b"Wikipedia");
    }

    #[test]
    fn trailing_slash_sets_redirect_flag() {
        let req = parse_fully(b"GET /foo/ HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(req.needs_redirect);
        assert_eq!(req.path, "/foo");
    }

    #[test]
    fn dot_dot_segment_is_rejected() {
        let mut req = HttpRequest::new();
        req.buffer
            .extend_from_slice(b"GET /../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.advance(1_048_576), Err(ParseError::PathTraversal));
    }

    #[test]
    fn body_over_cap_is_rejected() {
        let mut req = HttpRequest::new();
        req.buffer
            .extend_from_slice(b"POST /x HTTP/1.1\r\nContent-Length: 100\r\n\r\n");
        assert_eq!(req.advance(10), Err(ParseError::PayloadTooLarge));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let mut req = HttpRequest::new();
        req.buffer.extend_from_slice(b"ge t / HTTP/1.1\r\n\r\n");
        assert!(req.advance(1_048_576).is_err());
    }
}
