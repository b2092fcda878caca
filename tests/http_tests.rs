use vhost_server::http::{HttpRequest, Method, ParseError, ParsingState};

#[test]
fn head_request_parses_like_get() {
    let mut req = HttpRequest::new();
    req.buffer.extend_from_slice(b"HEAD /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
    req.advance(1_048_576).unwrap();
    assert_eq!(req.method, Method::Head);
    assert_eq!(req.path, "/index.html");
    assert_eq!(req.state, ParsingState::Complete);
}

#[test]
fn missing_content_length_and_transfer_encoding_means_empty_body() {
    let mut req = HttpRequest::new();
    req.buffer.extend_from_slice(b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n");
    req.advance(1_048_576).unwrap();
    assert_eq!(req.state, ParsingState::Complete);
    assert!(req.body.is_empty());
}

#[test]
fn request_line_split_across_two_reads_is_incomplete_then_complete() {
    let mut req = HttpRequest::new();
    req.buffer.extend_from_slice(b"GET /partial");
    assert_eq!(req.advance(1_048_576), Err(ParseError::Incomplete));

    req.buffer.extend_from_slice(b" HTTP/1.1\r\nHost: a\r\n\r\n");
    assert!(req.advance(1_048_576).is_ok());
    assert_eq!(req.path, "/partial");
}

#[test]
fn header_without_colon_is_rejected() {
    let mut req = HttpRequest::new();
    req.buffer.extend_from_slice(b"GET / HTTP/1.1\r\nBroken Header\r\n\r\n");
    assert_eq!(req.advance(1_048_576), Err(ParseError::InvalidHeaderLine));
}

#[test]
fn header_names_are_case_insensitive_and_last_wins() {
    let mut req = HttpRequest::new();
    req.buffer
        .extend_from_slice(b"GET / HTTP/1.1\r\nHost: first\r\nHOST: second\r\n\r\n");
    req.advance(1_048_576).unwrap();
    assert_eq!(req.headers.get("host").unwrap(), "second");
}

#[test]
fn host_header_strips_port_for_routing() {
    let mut req = HttpRequest::new();
    req.buffer
        .extend_from_slice(b"GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n");
    req.advance(1_048_576).unwrap();
    assert_eq!(req.host(), Some("example.com"));
}

#[test]
fn chunked_body_arriving_one_byte_at_a_time_decodes_correctly() {
    let raw: &[u8] = b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nfoo\r\n3\r\nbar\r\n0\r\n\r\n";
    let mut req = HttpRequest::new();
    for byte in raw {
        req.buffer.push(*byte);
        match req.advance(1_048_576) {
            Ok(()) if req.state == ParsingState::Complete => break,
            Ok(()) | Err(ParseError::Incomplete) => continue,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(req.state, ParsingState::Complete);
    assert_eq!(req.body, b"foobar");
}

#[test]
fn root_path_is_never_treated_as_needing_normalization() {
    let mut req = HttpRequest::new();
    req.buffer.extend_from_slice(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
    req.advance(1_048_576).unwrap();
    assert!(!req.needs_redirect);
    assert_eq!(req.path, "/");
}

#[test]
fn query_string_is_preserved_separately_from_path() {
    let mut req = HttpRequest::new();
    req.buffer
        .extend_from_slice(b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: a\r\n\r\n");
    req.advance(1_048_576).unwrap();
    assert_eq!(req.path, "/search");
    assert_eq!(req.query_string, "q=rust&page=2");
}
