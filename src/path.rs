//! # Virtual Path Algebra
//!
//! Normalization and comparison of virtual paths, independent of the host's
//! path conventions.
//!
//! ## Canonical Form
//!
//! - `\` is replaced with `/`
//! - leading separators are stripped
//! - [`PathStyle::Rooted`] re-prepends exactly one `/`; [`PathStyle::Relative`]
//!   does not
//! - the empty string stays empty (it denotes the locator root)
//!
//! Comparison is case-insensitive. Two paths name the same file iff their
//! normalized forms are equal after case folding.
//!
//! ```rust
//! use anyfs_locator::path::{self, PathStyle};
//!
//! assert_eq!(path::normalize("\\docs/a.txt", PathStyle::Rooted), "/docs/a.txt");
//! assert_eq!(path::normalize("//docs/a.txt", PathStyle::Relative), "docs/a.txt");
//! assert!(path::paths_equal("/A/b.txt", "/a/B.TXT"));
//! assert!(path::starts_with("/docs/a.txt", "docs"));
//! assert!(!path::starts_with("/docs2/a.txt", "docs"));
//! ```

/// Canonical separator for virtual paths.
pub const SEPARATOR: char = '/';

/// Alternate separator accepted on input.
pub const ALT_SEPARATOR: char = '\\';

/// Normalization flavor of a backing store.
///
/// System-directory and disc-image stores use [`Rooted`](PathStyle::Rooted)
/// paths (`/dir/file`); archive and in-memory stores use
/// [`Relative`](PathStyle::Relative) paths (`dir/file`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// Exactly one leading separator.
    Rooted,
    /// No leading separator.
    Relative,
}

/// Normalize a virtual path in the given style.
///
/// Idempotent: `normalize(normalize(p, s), s) == normalize(p, s)`.
pub fn normalize(path: &str, style: PathStyle) -> String {
    if path.is_empty() {
        return String::new();
    }

    let replaced = path.replace(ALT_SEPARATOR, "/");
    let trimmed = replaced.trim_start_matches(SEPARATOR);

    match style {
        PathStyle::Rooted => {
            let mut out = String::with_capacity(trimmed.len() + 1);
            out.push(SEPARATOR);
            out.push_str(trimmed);
            out
        }
        PathStyle::Relative => trimmed.to_owned(),
    }
}

/// Case-folded relative form, used as a lookup key.
///
/// Two paths have equal keys iff [`paths_equal`] holds for them.
pub fn key(path: &str) -> String {
    fold(&normalize(path, PathStyle::Relative))
}

/// Compare two paths after normalization, ignoring case.
pub fn paths_equal(a: &str, b: &str) -> bool {
    key(a) == key(b)
}

/// Segment-aware, case-insensitive prefix test.
///
/// `prefix` matches `path` when it is empty (or only separators), equal to
/// `path`, or names an ancestor directory of `path`. A prefix of `/ab` does
/// **not** match `/abc/x`; use [`starts_with_literal`] for the raw string
/// test.
pub fn starts_with(path: &str, prefix: &str) -> bool {
    let path = key(path);
    let prefix = key(prefix);

    if prefix.is_empty() {
        return true;
    }

    if !path.starts_with(&prefix) {
        return false;
    }

    prefix.ends_with(SEPARATOR)
        || path.len() == prefix.len()
        || path[prefix.len()..].starts_with(SEPARATOR)
}

/// Literal, case-insensitive string prefix test over normalized paths.
///
/// This is the historical subtree test: `/ab` matches `/abcdef`. Locators
/// scope enumeration with [`starts_with`] instead.
pub fn starts_with_literal(path: &str, prefix: &str) -> bool {
    key(path).starts_with(&key(prefix))
}

/// Non-empty segments of a path, after separator normalization.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split([SEPARATOR, ALT_SEPARATOR])
        .filter(|segment| !segment.is_empty())
}

/// Join a relative child onto a base, both in virtual space.
pub fn join(base: &str, child: &str, style: PathStyle) -> String {
    let base = normalize(base, PathStyle::Relative);
    let child = normalize(child, PathStyle::Relative);

    let joined = match (base.is_empty(), child.is_empty()) {
        (true, _) => child,
        (false, true) => base,
        (false, false) if base.ends_with(SEPARATOR) => format!("{base}{child}"),
        (false, false) => format!("{base}{SEPARATOR}{child}"),
    };

    normalize(&joined, style)
}

/// Drop the first `count` segments of `path`, returning the rest in `style`.
pub(crate) fn strip_segments(path: &str, count: usize, style: PathStyle) -> String {
    let rest: Vec<&str> = segments(path).skip(count).collect();
    normalize(&rest.join("/"), style)
}

fn fold(path: &str) -> String {
    path.chars().flat_map(char::to_lowercase).collect()
}
