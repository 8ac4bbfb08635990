//! Path utilities for validation, normalization and segment splitting
//!
//! All functions are **pure**: given same input, always produce same output with no side effects.

use std::borrow::Cow;

/// Validates if a path is in canonical form
///
/// # Rules
///
/// - Must start with `/`
/// - Must not contain `//` or `\`
/// - Must not end with `/` (except root `/`)
/// - Must not be empty
///
/// # Examples
///
/// ```
/// use waypost_router::path::is_valid_path;
///
/// assert!(is_valid_path("/"));
/// assert!(is_valid_path("/users/123"));
///
/// assert!(!is_valid_path(""));
/// assert!(!is_valid_path("about"));
/// assert!(!is_valid_path("/about/"));
/// assert!(!is_valid_path("/about//page"));
/// ```
pub fn is_valid_path(path: &str) -> bool {
    if path.is_empty() || !path.starts_with('/') {
        return false;
    }

    if path.contains("//") || path.contains('\\') {
        return false;
    }

    path == "/" || !path.ends_with('/')
}

/// Normalize a path to canonical form
///
/// Returns `Cow::Borrowed` when input is already valid (zero allocations),
/// `Cow::Owned` when normalization was needed.
///
/// - Trailing slashes: `/path/` → `/path`
/// - Double slashes: `/path//to` → `/path/to`
/// - Backslashes: `\path\to` → `/path/to`
///
/// # Examples
///
/// ```
/// use waypost_router::path::normalize_path;
/// use std::borrow::Cow;
///
/// assert!(matches!(normalize_path("/about"), Cow::Borrowed("/about")));
/// assert_eq!(normalize_path("/about/"), "/about");
/// assert_eq!(normalize_path("\\users\\123"), "/users/123");
/// ```
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if is_valid_path(path) {
        return Cow::Borrowed(path);
    }

    let normalized = path
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if normalized.is_empty() {
        Cow::Borrowed("/")
    } else {
        Cow::Owned(format!("/{}", normalized))
    }
}

/// Splits a request path into percent-decoded segments
///
/// Empty segments (leading, trailing or doubled slashes) are discarded.
/// A query string or fragment is not part of the path and is cut off first.
/// Segments that do not decode to valid UTF-8 are kept as written.
///
/// # Examples
///
/// ```
/// use waypost_router::path::split_path;
///
/// assert_eq!(split_path("/docs/hello%20world/"), vec!["docs", "hello world"]);
/// assert_eq!(split_path("/a//b?x=1"), vec!["a", "b"]);
/// assert!(split_path("/").is_empty());
/// ```
pub fn split_path(path: &str) -> Vec<Cow<'_, str>> {
    let path = path.split(['?', '#']).next().unwrap_or_default();

    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment)))
        .collect()
}
