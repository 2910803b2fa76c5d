//! Pure path utilities for the virtual namespace.
//!
//! Every function here is total and allocation-only: no I/O, no provider
//! awareness. `normalize` is the single source of truth for what counts as
//! a canonical absolute path; every other function in this crate, and every
//! path accepted by the mount table, assumes its input already passed
//! through it (or calls it first).

/// Normalize `p` into a canonical absolute path.
///
/// - Backslashes are treated as `/`.
/// - `.` segments are dropped.
/// - `..` segments pop the previous segment, but never rise above `/`
///   (`/..` normalizes to `/`, matching a chroot-style root).
/// - Redundant `/` separators collapse.
/// - The result never ends in `/` except for the root itself, which is
///   exactly `"/"`.
/// - An empty input, or one that resolves to nothing, normalizes to `/`.
#[must_use]
pub fn normalize(p: &str) -> String {
    let p = p.replace('\\', "/");
    let mut stack: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            seg => stack.push(seg),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Return the final path segment, or `"/"` for the root.
///
/// The input is normalized first, so `basename("/a/b/")` and
/// `basename("/a/b")` agree.
#[must_use]
pub fn basename(p: &str) -> String {
    let n = normalize(p);
    if n == "/" {
        return "/".to_string();
    }
    n.rsplit('/').next().unwrap_or("").to_string()
}

/// Join a normalized directory path with a single, `/`-free name.
///
/// Exactly one `/` separates `dir` and `name`; the result is re-normalized
/// so a root `dir` of `"/"` does not produce a doubled slash.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize(dir);
    if dir == "/" {
        normalize(&format!("/{name}"))
    } else {
        normalize(&format!("{dir}/{name}"))
    }
}

/// Return the inner path of `abs_path` relative to `mount_prefix`.
///
/// Both inputs are normalized first. The inner path has no leading `/`; it
/// is the empty string when `abs_path == mount_prefix`. Returns `None` when
/// `abs_path` does not lie under `mount_prefix`.
#[must_use]
pub fn strip_prefix(mount_prefix: &str, abs_path: &str) -> Option<String> {
    let prefix = normalize(mount_prefix);
    let path = normalize(abs_path);

    if path == prefix {
        return Some(String::new());
    }

    if prefix == "/" {
        return Some(path.trim_start_matches('/').to_string());
    }

    let with_slash = format!("{prefix}/");
    path.strip_prefix(&with_slash).map(str::to_string)
}

/// Whether `p`, once normalized, is the root path.
#[must_use]
pub fn is_root(p: &str) -> bool {
    normalize(p) == "/"
}

/// Split a normalized absolute path into `(parent, name)`.
///
/// The root's parent is itself (`"/"`) with an empty name.
#[must_use]
pub fn split(p: &str) -> (String, String) {
    let n = normalize(p);
    if n == "/" {
        return ("/".to_string(), String::new());
    }
    match n.rfind('/') {
        Some(0) => ("/".to_string(), n[1..].to_string()),
        Some(idx) => (n[..idx].to_string(), n[idx + 1..].to_string()),
        None => ("/".to_string(), n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let cases = [
            "/", "", ".", "/a/b/c", "/a/../b", "/a/./b/", "a/b", "//a//b//", "/../../a", "\\a\\b",
        ];
        for p in cases {
            let once = normalize(p);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {p:?}");
        }
    }

    #[test]
    fn normalize_collapses_dots_and_slashes() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("."), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/a/b/c"), "/a/b/c");
        assert_eq!(normalize("/a//b"), "/a/b");
        assert_eq!(normalize("/a/./b/"), "/a/b");
        assert_eq!(normalize("/a/../b"), "/b");
        assert_eq!(normalize("a/b"), "/a/b");
    }

    #[test]
    fn normalize_never_escapes_root() {
        assert_eq!(normalize("/.."), "/");
        assert_eq!(normalize("/../../.."), "/");
        assert_eq!(normalize("/a/../../.."), "/");
    }

    #[test]
    fn normalize_converts_backslashes() {
        assert_eq!(normalize("\\a\\b"), "/a/b");
    }

    #[test]
    fn basename_examples() {
        assert_eq!(basename("/"), "/");
        assert_eq!(basename("/a/b/c"), "c");
        assert_eq!(basename("/a/b/"), "b");
        assert_eq!(basename("single"), "single");
    }

    #[test]
    fn join_examples() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a/b", "c"), "/a/b/c");
        assert_eq!(join("/a/b/", "c"), "/a/b/c");
    }

    #[test]
    fn strip_prefix_roundtrips_with_join() {
        // Property 2 from spec.md §8: for any absolute canonical p and
        // non-empty name without '/', stripPrefix(p, join(p, name)) == name.
        for p in ["/", "/a", "/a/b", "/home/tester"] {
            for name in ["x", "file.txt", "a.b.c"] {
                let joined = join(p, name);
                assert_eq!(strip_prefix(p, &joined).as_deref(), Some(name));
            }
        }
    }

    #[test]
    fn strip_prefix_exact_match_is_empty() {
        assert_eq!(strip_prefix("/a/b", "/a/b").as_deref(), Some(""));
        assert_eq!(strip_prefix("/", "/").as_deref(), Some(""));
    }

    #[test]
    fn strip_prefix_rejects_non_descendant() {
        assert_eq!(strip_prefix("/a/b", "/a/bc"), None);
        assert_eq!(strip_prefix("/a/b", "/other"), None);
    }

    #[test]
    fn split_examples() {
        assert_eq!(split("/"), ("/".to_string(), String::new()));
        assert_eq!(split("/a"), ("/".to_string(), "a".to_string()));
        assert_eq!(split("/a/b/c"), ("/a/b".to_string(), "c".to_string()));
    }
}
