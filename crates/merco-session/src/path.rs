//! String path helpers.
//!
//! Store paths are `/`-separated, relative to the strategy workspace root, and
//! the root itself is the empty string. Nodes and tabs are keyed by the
//! normalized form, so every path entering the crate goes through
//! [`normalize`] first.

/// Normalize a path: drop leading/trailing/doubled `/`, resolve `.` and `..`.
///
/// `..` never climbs above the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Last segment of a path, or `""` for the root.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
}

/// Parent of a normalized path. The root has no parent.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""))
}

/// Join a child name onto a normalized directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// True if `path` is `ancestor` or lies underneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_noise() {
        assert_eq!(normalize("/a//b/./c/"), "a/b/c");
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("../../a"), "a");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn basename_and_parent() {
        assert_eq!(basename("strategies/alpha/lib.rs"), "lib.rs");
        assert_eq!(basename("lib.rs"), "lib.rs");
        assert_eq!(basename(""), "");
        assert_eq!(parent("strategies/alpha/lib.rs"), Some("strategies/alpha"));
        assert_eq!(parent("lib.rs"), Some(""));
        assert_eq!(parent(""), None);
    }

    #[test]
    fn within_respects_segment_boundaries() {
        assert!(is_within("alpha/lib.rs", "alpha"));
        assert!(is_within("alpha", "alpha"));
        assert!(is_within("anything", ""));
        assert!(!is_within("alphabet/lib.rs", "alpha"));
        assert!(!is_within("alpha", "alpha/lib.rs"));
    }

    #[test]
    fn join_at_root() {
        assert_eq!(join("", "a.rs"), "a.rs");
        assert_eq!(join("dir", "a.rs"), "dir/a.rs");
    }
}
