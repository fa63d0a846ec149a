//! Path canonicalization: everything downstream of the watcher works on
//! project-root-relative, forward-slash paths.

use std::path::{Component, Path};

/// Normalize `path` to root-relative, forward-slash form.
///
/// Absolute paths are stripped of the root prefix; relative paths are taken
/// as already root-relative. Returns `None` for paths outside the root or
/// containing `..` components.
pub fn normalize(root: &Path, path: &Path) -> Option<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };

    let mut out = String::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(part.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// File suffix of a normalized path (`"js"` for `a/b.web.js`), if any.
pub fn suffix(rel: &str) -> Option<&str> {
    let basename = rel.rsplit('/').next()?;
    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => Some(ext),
        _ => None,
    }
}
