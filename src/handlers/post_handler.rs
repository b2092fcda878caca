use crate::prelude::*;

/// §4.6.2: branches on Content-Type. `multipart/form-data` writes every filed
/// part to `upload_path`; `application/x-www-form-urlencoded` is parsed into
/// `k=v` pairs and acknowledged; `text/plain`/`application/json` are echoed
/// back; anything else is 415.
pub fn handle_post(request: &HttpRequest, r_cfg: &RouteConfig, s_cfg: &Arc<ServerConfig>) -> HttpResponse {
    let content_type = request.headers.get("content-type").cloned().unwrap_or_default();
    let base_type = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();

    match base_type.as_str() {
        "multipart/form-data" => handle_multipart(request, r_cfg, s_cfg, &content_type),
        "application/x-www-form-urlencoded" => handle_urlencoded(request),
        "text/plain" | "application/json" => handle_echo(request),
        _ => HttpResponse::handle_error(HTTP_UNSUPPORTED_MEDIA_TYPE, Some(s_cfg)),
    }
}

fn handle_multipart(request: &HttpRequest, r_cfg: &RouteConfig, s_cfg: &Arc<ServerConfig>, content_type: &str) -> HttpResponse {
    if r_cfg.upload_dir.is_empty() {
        // No 403 in the closed failure vocabulary (§4.9/§7); a location with
        // no configured upload_path can't service the upload at all.
        return HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg));
    }
    // upload_path is resolved relative to the process cwd, not the route root, §6 Filesystem.
    let upload_dir = PathBuf::from(&r_cfg.upload_dir);
    if fs::create_dir_all(&upload_dir).is_err() {
        return HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg));
    }

    let boundary = content_type
        .split(';')
        .find_map(|p| p.trim().strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string());
    let Some(boundary) = boundary else {
        return HttpResponse::handle_error(HTTP_BAD_REQUEST, Some(s_cfg));
    };

    match Upload::save_multipart(&upload_dir, &request.body, &boundary, content_type) {
        Ok(upload) => {
            let rows: String = upload
                .saved_filenames
                .iter()
                .map(|name| format!("<li>{}</li>", html_escape(name)))
                .collect();
            let body = format!(
                "<html><head><title>Upload complete</title></head><body>\n\
                 <h1>Upload complete</h1>\n<ul>\n{rows}</ul>\n</body></html>"
            );
            HttpResponse::new(HTTP_OK)
                .set_header("content-type", "text/html")
                .set_body(body.into_bytes())
        }
        Err(_) => HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
    }
}

fn handle_urlencoded(request: &HttpRequest) -> HttpResponse {
    let pairs = parse_urlencoded(&request.body);
    let rows: String = pairs
        .iter()
        .map(|(k, v)| format!("<li>{} = {}</li>", html_escape(k), html_escape(v)))
        .collect();
    let body = format!(
        "<html><head><title>Form received</title></head><body>\n\
         <h1>Form received</h1>\n<ul>\n{rows}</ul>\n</body></html>"
    );
    HttpResponse::new(HTTP_OK)
        .set_header("content-type", "text/html")
        .set_body(body.into_bytes())
}

fn handle_echo(request: &HttpRequest) -> HttpResponse {
    let escaped = html_escape(&String::from_utf8_lossy(&request.body));
    let body = format!(
        "<html><head><title>Echo</title></head><body>\n<pre>{escaped}</pre>\n</body></html>"
    );
    HttpResponse::new(HTTP_OK)
        .set_header("content-type", "text/html")
        .set_body(body.into_bytes())
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Decodes `k=v&k=v` pairs per §4.6.2, percent-decoding both key and value.
fn parse_urlencoded(body: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_field(k), decode_field(v))
        })
        .collect()
}

fn decode_field(raw: &str) -> String {
    String::from_utf8_lossy(&percent_decode(raw.as_bytes())).into_owned()
}

/// `+` -> space, `%XX` -> byte.
fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 3 <= input.len() => {
                let hex = std::str::from_utf8(&input[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(input[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}
