use crate::prelude::*;

/// §4.6.1's `\.[A-Za-z0-9]+$` test against the URL's last segment — the
/// file/directory decision is made on the request target, not on a
/// filesystem stat of the resolved path.
fn url_has_file_extension(url_path: &str) -> bool {
    let last_segment = url_path.rsplit('/').next().unwrap_or("");
    match last_segment.rfind('.') {
        Some(idx) if idx + 1 < last_segment.len() => {
            last_segment[idx + 1..].bytes().all(|b| b.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

pub fn handle_get(request: &HttpRequest, r_cfg: &RouteConfig, s_cfg: &Arc<ServerConfig>) -> (HttpResponse, ActiveAction) {
    let relative = request.path.strip_prefix(&r_cfg.path).unwrap_or(&request.path);
    let mut path = PathBuf::from(&r_cfg.root);
    path.push(relative.trim_start_matches('/'));

    if !url_has_file_extension(&request.path) {
        let index_candidate = if r_cfg.default_file.is_empty() {
            None
        } else {
            let candidate = path.join(&r_cfg.default_file);
            candidate.is_file().then_some(candidate)
        };

        match index_candidate {
            Some(candidate) => path = candidate,
            None if r_cfg.autoindex => {
                let host = request.host().unwrap_or(&s_cfg.server_name);
                let autoindex = generate_autoindex(&path, &request.path, host, s_cfg.listen_port);
                return (autoindex, ActiveAction::None);
            }
            // No index present and autoindex off: §4.6.1 "If not found: 404."
            None => return (HttpResponse::handle_error(HTTP_NOT_FOUND, Some(s_cfg)), ActiveAction::None),
        }
    }

    match File::open(&path) {
        Ok(file) => {
            let Ok(metadata) = file.metadata() else {
                return (
                    HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
                    ActiveAction::None,
                );
            };
            // An extension-bearing URL that resolves to a directory on disk is
            // not a regular file either; §4.6.1 never asks for index/autoindex
            // treatment here since the URL itself picked the file branch.
            if metadata.is_dir() {
                return (HttpResponse::handle_error(HTTP_NOT_FOUND, Some(s_cfg)), ActiveAction::None);
            }
            let file_size = metadata.size() as usize;
            let mime_type = get_mime_type(&path);
            let response = HttpResponse::new(HTTP_OK)
                .set_header("content-type", mime_type)
                .set_header("content-length", &file_size.to_string());
            (response, ActiveAction::FileDownload(file, file_size))
        }
        Err(_) => {
            // §4.9/§7: no 403 in the closed failure vocabulary — lookup/access
            // failures all map to 404 here.
            (HttpResponse::handle_error(HTTP_NOT_FOUND, Some(s_cfg)), ActiveAction::None)
        }
    }
}
