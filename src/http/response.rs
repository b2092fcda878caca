use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16) -> Self {
        HttpResponse {
            version: "HTTP/1.1".to_string(),
            status_text: status_text(status_code).to_string(),
            status_code,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn set_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn set_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// §4.6.4: status line from {301, 302, 307, 308} uses the real reason
    /// phrase; any other configured `return_code` is emitted as `"<code>
    /// Redirect"` rather than falling through to the generic `status_text`
    /// table's `"Unknown"`.
    pub fn redirect(code: u16, target: &str) -> Self {
        let status_text = match code {
            301 | 302 | 307 | 308 => status_text(code).to_string(),
            other => format!("{other} Redirect"),
        };
        HttpResponse {
            version: "HTTP/1.1".to_string(),
            status_code: code,
            status_text,
            headers: HashMap::new(),
            body: Vec::new(),
        }
        .set_header("location", target)
    }

    /// Default error body for a code without a configured error page.
    pub fn error(code: u16) -> Self {
        let text = status_text(code);
        let body = format!(
            "<html><head><title>{code} {text}</title></head><body><h1>{code} {text}</h1></body></html>"
        );
        HttpResponse::new(code)
            .set_header("content-type", "text/html")
            .set_body(body.into_bytes())
    }

    /// §4.6.5: serve a configured error page file if present, else the default body.
    pub fn handle_error(code: u16, s_cfg: Option<&Arc<ServerConfig>>) -> HttpResponse {
        if let Some(cfg) = s_cfg {
            if let Some(page_path) = cfg.error_pages.get(&code) {
                if let Ok(contents) = fs::read(page_path) {
                    return HttpResponse::new(code)
                        .set_header("content-type", "text/html")
                        .set_body(contents);
                }
            }
        }
        HttpResponse::error(code)
    }

    fn assemble(&self, server_name: &str, include_body: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status_code, self.status_text).as_bytes(),
        );

        let mut headers = self.headers.clone();
        headers
            .entry("content-length".to_string())
            .or_insert_with(|| self.body.len().to_string());
        headers
            .entry("date".to_string())
            .or_insert_with(|| http_date(SystemTime::now()));
        headers
            .entry("server".to_string())
            .or_insert_with(|| server_name.to_string());
        headers
            .entry("content-type".to_string())
            .or_insert_with(|| "text/html".to_string());

        for (key, value) in &headers {
            out.extend_from_slice(format!("{}: {}\r\n", to_header_case(key), value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if include_body {
            out.extend_from_slice(&self.body);
        }
        out
    }

    pub fn to_bytes(&self, server_name: &str) -> Vec<u8> {
        self.assemble(server_name, true)
    }

    /// HEAD responses: identical headers (real Content-Length included) but no
    /// body on the wire, per §4.6.1.
    pub fn to_bytes_headers_only(&self, server_name: &str) -> Vec<u8> {
        self.assemble(server_name, false)
    }
}

fn to_header_case(key: &str) -> String {
    key.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Closed content-type set for GET/HEAD responses, §4.6.1.
pub fn get_mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        _ => "text/html",
    }
}

/// Reverse lookup used only to name an uploaded file when the client didn't
/// supply a filename; not part of the GET/HEAD content-type contract above.
pub fn get_ext_from_content_type(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or("").trim() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "text/plain" => "txt",
        "application/json" => "json",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// Unsorted directory listing (§8 P7 / §9 open question), with an explicit
/// `..` entry since `read_dir` never yields it itself.
pub fn generate_autoindex(dir_path: &Path, url_path: &str, host: &str, port: u16) -> HttpResponse {
    let base = format!("http://{host}:{port}{url_path}");
    let mut rows = format!("<li><a href=\"{base}/../\">../</a></li>\n");

    match fs::read_dir(dir_path) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                let suffix = if is_dir { "/" } else { "" };
                rows.push_str(&format!(
                    "<li><a href=\"{base}/{name}{suffix}\">{name}{suffix}</a></li>\n"
                ));
            }
        }
        // §4.9/§7: no 403 in the closed failure vocabulary; an inaccessible
        // directory is a lookup/access failure, which maps to 404.
        Err(_) => return HttpResponse::handle_error(HTTP_NOT_FOUND, None),
    }

    let html = format!(
        "<html><head><title>Index of {url_path}</title></head><body>\n\
         <h1>Index of {url_path}</h1>\n<ul>\n{rows}</ul>\n</body></html>"
    );

    HttpResponse::new(HTTP_OK)
        .set_header("content-type", "text/html")
        .set_body(html.into_bytes())
}

/// RFC 7231 IMF-fixdate, e.g. "Sun, 06 Nov 1994 08:49:37 GMT".
pub fn http_date(time: SystemTime) -> String {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let days = secs.div_euclid(86_400);
    let time_of_day = secs.rem_euclid(86_400);
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);

    let (year, month, day) = civil_from_days(days);
    let weekday = weekday_from_days(days);

    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[weekday as usize],
        day,
        MONTHS[(month - 1) as usize],
        year,
        hour,
        minute,
        second
    )
}

/// Howard Hinnant's civil_from_days: days-since-epoch -> proleptic Gregorian (y, m, d).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

fn weekday_from_days(z: i64) -> i64 {
    if z >= -4 {
        (z + 4) % 7
    } else {
        (z + 5) % 7 + 6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_closed_set() {
        assert_eq!(get_mime_type(Path::new("a.css")), "text/css");
        assert_eq!(get_mime_type(Path::new("a.js")), "application/javascript");
        assert_eq!(get_mime_type(Path::new("a.json")), "application/json");
        assert_eq!(get_mime_type(Path::new("a.png")), "text/html");
        assert_eq!(get_mime_type(Path::new("a")), "text/html");
    }

    #[test]
    fn redirect_sets_location_and_empty_body() {
        let resp = HttpResponse::redirect(301, "/foo");
        assert_eq!(resp.status_code, 301);
        assert_eq!(resp.headers.get("location").unwrap(), "/foo");
        assert!(resp.body.is_empty());
    }

    #[test]
    fn known_epoch_date_formats_correctly() {
        // 2000-01-01T00:00:00Z is 946684800.
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(946_684_800);
        assert_eq!(http_date(t), "Sat, 01 Jan 2000 00:00:00 GMT");
    }

    #[test]
    fn headers_only_keeps_real_content_length() {
        let resp = HttpResponse::new(HTTP_OK).set_body(b"hello".to_vec());
        let bytes = resp.to_bytes_headers_only("vhost_server");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Content-Length: 5"));
        assert!(!text.contains("hello"));
    }

    #[test]
    fn handle_error_falls_back_without_config() {
        let resp = HttpResponse::handle_error(HTTP_NOT_FOUND, None);
        assert_eq!(resp.status_code, 404);
        assert!(String::from_utf8_lossy(&resp.body).contains("404"));
    }
}
