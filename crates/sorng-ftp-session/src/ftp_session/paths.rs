//! Remote path helpers. Remote paths are always `/`-separated and
//! normalised without a trailing slash (the root is `/`).

/// Iterate the non-empty segments of a remote path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Normalise a remote path: collapse duplicate slashes, drop the trailing
/// slash, make it absolute.
pub fn normalize(path: &str) -> String {
    let mut out = String::from("/");
    for seg in segments(path) {
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(seg);
    }
    out
}

/// Append one segment to a normalised directory path.
pub fn join(dir: &str, name: &str) -> String {
    let name = name.trim_matches('/');
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent directory of a remote path (`/` for top-level entries and for
/// the root itself).
pub fn parent(path: &str) -> String {
    let norm = normalize(path);
    match norm.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => norm[..idx].to_string(),
    }
}

/// Last segment of a remote path, or `""` for the root.
pub fn file_name(path: &str) -> &str {
    segments(path).last().unwrap_or("")
}

/// Whether `path` is an absolute remote path.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// If `path` lives under `prefix`, return the remainder without its
/// leading slash. Matches whole segments only.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with('/') {
        Some(rest.trim_start_matches('/'))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("a//b/"), "/a/b");
        assert_eq!(normalize("/var/www/"), "/var/www");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("/a/b/c.txt"), "/a/b");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(file_name("/a/b/c.txt"), "c.txt");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/a/", "/b/"), "/a/b");
    }

    #[test]
    fn test_strip_prefix_whole_segments() {
        assert_eq!(strip_prefix("/www/site/index.html", "/www"), Some("site/index.html"));
        assert_eq!(strip_prefix("/www", "/www/"), Some(""));
        assert_eq!(strip_prefix("/wwwroot/x", "/www"), None);
        assert_eq!(strip_prefix("/x/y", "/"), Some("x/y"));
    }
}
