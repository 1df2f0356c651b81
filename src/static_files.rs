//! Static file responder for `/static/...`.
//!
//! The segments after `static` are resolved under the public root. Only a
//! fixed set of extensions is served.

use crate::error::AppError;
use crate::validate_path_within;
use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Content type for an allow-listed extension.
pub fn content_type_for(ext: &str) -> Option<&'static str> {
    match ext {
        "html" => Some("text/html"),
        "css" => Some("text/css"),
        "js" => Some("text/javascript"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Reject segments that could step outside the root or confuse the OS.
fn check_segments(segments: &[String]) -> Result<(), AppError> {
    if segments.is_empty() {
        return Err(AppError::BadRequest("empty static path".into()));
    }
    for seg in segments {
        if seg == "." || seg == ".." || seg.contains(['/', '\\', '\0']) || seg.contains(':') {
            warn!(segment = %seg, "rejected static path segment");
            return Err(AppError::BadRequest("malformed static path".into()));
        }
    }
    Ok(())
}

/// Map the request onto a file under `root` and decide its content type.
/// The extension policy is applied before the filesystem is touched.
pub fn resolve_static_path(root: &Path, segments: &[String]) -> Result<(PathBuf, &'static str), AppError> {
    check_segments(segments)?;

    let file_name = segments.last().map(String::as_str).unwrap_or_default();
    let ext = match file_name.rfind('.') {
        Some(i) if i + 1 < file_name.len() => &file_name[i + 1..],
        _ => return Err(AppError::BadRequest("missing file extension".into())),
    };
    let content_type = content_type_for(&ext.to_ascii_lowercase())
        .ok_or_else(|| AppError::Internal(format!("unsupported static file type: {}", ext)))?;

    let path = segments.iter().fold(root.to_path_buf(), |p, seg| p.join(seg));
    Ok((path, content_type))
}

fn io_error(path: &Path, e: std::io::Error) -> AppError {
    if e.kind() == ErrorKind::NotFound {
        AppError::NotFound
    } else {
        AppError::Internal(format!("reading {}: {}", path.display(), e))
    }
}

/// Serve one file. The path is canonicalised and bounded under `root`
/// before anything is opened, and only regular files are read.
pub async fn serve(root: &Path, segments: &[String]) -> Result<Response, AppError> {
    let (path, content_type) = resolve_static_path(root, segments)?;

    let bounded = {
        let (root, path) = (root.to_path_buf(), path.clone());
        tokio::task::spawn_blocking(move || validate_path_within(&root, &path))
            .await
            .map_err(|e| AppError::Internal(format!("path check task failed: {}", e)))?
    };
    let canonical = match bounded {
        Ok(Some(canonical)) => canonical,
        Ok(None) => {
            // Symlinks inside the root could still point elsewhere.
            warn!(path = %path.display(), "static path escapes public root");
            return Err(AppError::NotFound);
        }
        Err(e) => return Err(io_error(&path, e)),
    };

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| io_error(&canonical, e))?;
    if !metadata.is_file() {
        warn!(path = %canonical.display(), "static path is not a regular file");
        return Err(AppError::NotFound);
    }

    let bytes = tokio::fs::read(&canonical)
        .await
        .map_err(|e| io_error(&canonical, e))?;

    debug!(path = %canonical.display(), content_type, "serving static file");
    Ok((StatusCode::OK, [(CONTENT_TYPE, content_type)], bytes).into_response())
}
