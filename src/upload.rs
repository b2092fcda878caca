use crate::prelude::*;

#[derive(Debug)]
pub enum UploadError {
    Io(std::io::Error),
    NoFilesSaved,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Io(e) => write!(f, "upload write failed: {}", e),
            UploadError::NoFilesSaved => write!(f, "no file parts found in upload body"),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e)
    }
}

/// Outcome of a completed upload, used by the POST handler to build the 200 response.
#[derive(Debug, Default)]
pub struct Upload {
    pub saved_filenames: Vec<String>,
}

impl Upload {
    /// multipart/form-data: a single pass over the fully-buffered body, §4.6.2.
    pub fn save_multipart(
        dir: &Path,
        body: &[u8],
        boundary: &str,
        fallback_content_type: &str,
    ) -> std::result::Result<Upload, UploadError> {
        let marker = format!("--{boundary}");
        let marker_bytes = marker.as_bytes();
        let mut saved = Vec::new();

        let Some(first) = find_subsequence(body, marker_bytes, 0) else {
            return Err(UploadError::NoFilesSaved);
        };
        let mut pos = first + marker_bytes.len();

        loop {
            if body.get(pos..pos + 2) == Some(b"--") {
                break;
            }
            if body.get(pos..pos + 2) == Some(b"\r\n") {
                pos += 2;
            }

            let Some(header_end) = find_subsequence(body, b"\r\n\r\n", pos) else {
                break;
            };
            let headers_str = String::from_utf8_lossy(&body[pos..header_end]);
            let info = parse_part_headers(&headers_str);
            let data_start = header_end + 4;

            let Some(next_marker) = find_subsequence(body, marker_bytes, data_start) else {
                break;
            };
            let mut data_end = next_marker;
            if data_end >= 2 && &body[data_end - 2..data_end] == b"\r\n" {
                data_end -= 2;
            }
            let data = &body[data_start..data_end];

            if let Some(raw_name) = info.filename.as_deref() {
                let content_type = if info.content_type.is_empty() {
                    fallback_content_type
                } else {
                    info.content_type.as_str()
                };
                let clean_name = if raw_name.is_empty() {
                    format!("upload.{}", get_ext_from_content_type(content_type))
                } else {
                    sanitize_filename(raw_name)
                };
                let path = get_unique_path(dir, &clean_name);
                fs::write(&path, data)?;
                saved.push(path.file_name().unwrap().to_string_lossy().into_owned());
            }

            pos = next_marker + marker_bytes.len();
        }

        if saved.is_empty() {
            return Err(UploadError::NoFilesSaved);
        }
        Ok(Upload { saved_filenames: saved })
    }

}

/// Extracts only the file_name component, then keeps alphanumerics/`.`/`_`/`-`.
pub fn sanitize_filename(name: &str) -> String {
    let raw_name = Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");

    let sanitized: String = raw_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect();

    if sanitized.is_empty() || sanitized.starts_with('.') {
        format!("upload_{sanitized}")
    } else {
        sanitized
    }
}

/// Appends `_1`, `_2`, ... before the extension until the path doesn't collide.
pub fn get_unique_path(directory: &Path, filename: &str) -> PathBuf {
    let mut full_path = directory.join(filename);
    let mut counter = 1;

    while full_path.exists() {
        let stem = Path::new(filename).file_stem().and_then(|s| s.to_str()).unwrap_or("file");
        let ext = Path::new(filename).extension().and_then(|s| s.to_str()).unwrap_or("");

        let new_name = if ext.is_empty() {
            format!("{stem}_{counter}")
        } else {
            format!("{stem}_{counter}.{ext}")
        };
        full_path = directory.join(new_name);
        counter += 1;
    }
    full_path
}
