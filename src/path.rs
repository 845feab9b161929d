use crate::RemoteError;

use std::borrow::Cow;

fn canonicalize_rel_path(path: &str, allow_empty: bool) -> Result<Cow<'_, str>, RemoteError> {
    let trimmed = path.trim().trim_matches('/');

    if trimmed.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(RemoteError::InvalidPath("empty path".into()));
    }

    // Repository paths are always forward-slash separated; anything else is
    // the caller handing us an OS path by mistake.
    if trimmed.contains('\0') || trimmed.contains('\\') {
        return Err(RemoteError::InvalidPath("unsafe path".into()));
    }

    let mut parts: Vec<&str> = Vec::new();
    let mut needs_alloc = false;

    for seg in trimmed.split('/') {
        if seg.is_empty() || seg == "." {
            needs_alloc = true;
            continue;
        }
        if seg == ".." {
            return Err(RemoteError::InvalidPath("unsafe path".into()));
        }
        parts.push(seg);
    }

    if parts.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(RemoteError::InvalidPath("empty path".into()));
    }

    if !needs_alloc {
        return Ok(Cow::Borrowed(trimmed));
    }

    Ok(Cow::Owned(parts.join("/")))
}

pub(crate) fn validate_rel_path(path: &str) -> Result<String, RemoteError> {
    Ok(canonicalize_rel_path(path, false)?.into_owned())
}

pub(crate) fn validate_rel_dir_path(path: &str) -> Result<String, RemoteError> {
    Ok(canonicalize_rel_path(path, true)?.into_owned())
}

/// Returns the parent directory of a canonical relative path (`""` for
/// top-level entries).
pub(crate) fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}
