//! Path normalization for the driver's virtual namespace.
//!
//! Every path the driver hands to its cache is absolute, `/`-separated and
//! free of `.`/`..` segments. Remote names are not OS paths, so this works on
//! `str` rather than [`std::path::Path`].

use crate::error::{ErrorKind, Result};

/// The root of the namespace, bound to the remote root container.
pub const ROOT: &str = "/";

/// Normalizes a path into its canonical absolute form.
///
/// Relative paths are taken relative to the root. Empty segments and `.` are
/// dropped, `..` pops a segment but may never climb above the root.
///
/// > **Note:** Null bytes are rejected; backslashes are ordinary name bytes.
///
/// # Examples
///
/// ```
/// use drivefs_driver::path::normalize;
/// assert_eq!(normalize("/a//b/./c/").unwrap(), "/a/b/c");
/// assert_eq!(normalize("a/b/..").unwrap(), "/a");
/// assert_eq!(normalize("").unwrap(), "/");
/// assert!(normalize("/a/../../etc").is_err());
/// assert!(normalize("/a\0b").is_err());
/// ```
pub fn normalize(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_string()));
                }
            },
            name if name.contains('\0') => exn::bail!(ErrorKind::InvalidPath(path.to_string())),
            name => segments.push(name),
        }
    }
    if segments.is_empty() {
        return Ok(ROOT.to_string());
    }
    Ok(segments.iter().fold(String::with_capacity(path.len() + 1), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    }))
}

/// Splits a normalized path into its parent path and final name.
///
/// Returns `None` for the root, which has no parent.
pub fn split(path: &str) -> Option<(&str, &str)> {
    if path == ROOT {
        return None;
    }
    let index = path.rfind('/')?;
    let parent = if index == 0 { ROOT } else { &path[..index] };
    Some((parent, &path[index + 1..]))
}

/// Joins a normalized container path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    match parent {
        ROOT => format!("/{name}"),
        _ => format!("{parent}/{name}"),
    }
}

/// Iterates over the names along a normalized path, outermost first.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Returns `true` if `path` is `ancestor` itself or lives somewhere beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
