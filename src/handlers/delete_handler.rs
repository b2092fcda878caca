use crate::prelude::*;

/// Path-traversal-safe delete: resolves the target against `upload_path`
/// (resolved against the process cwd when relative, §6 Filesystem) and
/// rejects anything that canonicalizes outside of it, §4.6.3.
pub fn handle_delete(request: &HttpRequest, r_cfg: &RouteConfig, s_cfg: &Arc<ServerConfig>) -> HttpResponse {
    let upload_base = PathBuf::from(&r_cfg.upload_dir);
    let relative = request.path.strip_prefix(&r_cfg.path).unwrap_or("");
    let target_path = upload_base.join(relative.trim_start_matches('/'));

    let Ok(absolute_upload_base) = upload_base.canonicalize() else {
        return HttpResponse::handle_error(HTTP_NOT_FOUND, Some(s_cfg));
    };

    // §4.6.3's vocabulary is only "missing -> 404" / "unlinked -> 200" /
    // "otherwise -> 500" — no 403 branch exists, so every non-missing failure
    // below (traversal outside upload_dir, a directory target, a permission
    // error) falls through to 500.
    let absolute_target = match target_path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            let code = if e.kind() == ErrorKind::NotFound {
                HTTP_NOT_FOUND
            } else {
                HTTP_INTERNAL_SERVER_ERROR
            };
            return HttpResponse::handle_error(code, Some(s_cfg));
        }
    };

    if !absolute_target.starts_with(&absolute_upload_base) {
        return HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg));
    }
    if absolute_target.is_dir() {
        return HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg));
    }

    match fs::remove_file(&absolute_target) {
        Ok(()) => HttpResponse::new(HTTP_OK)
            .set_header("content-type", "text/html")
            .set_body(b"<html><body><h1>Deleted</h1></body></html>".to_vec()),
        Err(_) => HttpResponse::handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
    }
}
