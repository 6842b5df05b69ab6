//! Entry name → dotted Java class name.
//!
//! Inner and anonymous classes (`Outer$Inner`, `Outer$1`) are kept verbatim as
//! their own searchable names rather than folded into the outer class.

const CLASS_SUFFIX: &str = ".class";

/// Directories that hold classes without being part of their package name.
const CLASS_ROOTS: [&str; 2] = ["WEB-INF/classes/", "BOOT-INF/classes/"];

const MULTI_RELEASE_PREFIX: &str = "META-INF/versions/";

pub fn class_name(entry_name: &str) -> Option<String> {
    if entry_name.ends_with('/') || entry_name.ends_with('\\') {
        return None;
    }
    let split = entry_name.len().checked_sub(CLASS_SUFFIX.len())?;
    if !entry_name.is_char_boundary(split) {
        return None;
    }
    let (stem, suffix) = entry_name.split_at(split);
    if !suffix.eq_ignore_ascii_case(CLASS_SUFFIX) {
        return None;
    }

    let stem = strip_class_root(stem.trim_start_matches('/'));
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.replace(['/', '\\'], "."))
}

fn strip_class_root(path: &str) -> &str {
    for root in CLASS_ROOTS {
        if let Some(rest) = path.strip_prefix(root) {
            return rest;
        }
    }

    if let Some(rest) = path.strip_prefix(MULTI_RELEASE_PREFIX)
        && let Some((version, rest)) = rest.split_once('/')
        && !version.is_empty()
        && version.bytes().all(|b| b.is_ascii_digit())
    {
        return rest;
    }

    path
}
