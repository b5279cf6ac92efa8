//! Path matching logic.
//!
//! # Responsibilities
//! - Match exact paths and path prefixes (case-sensitive)
//! - Match file extensions of the last path segment (case-insensitive)
//!
//! # Design Decisions
//! - Patterns are `'static` data so the classification table is a const
//! - No regex to guarantee O(n) matching

/// A condition on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPattern {
    /// Path equals one of the listed values.
    Exact(&'static [&'static str]),
    /// Path starts with one of the listed prefixes.
    Prefix(&'static [&'static str]),
    /// Last path segment ends in `.<ext>` for one of the listed extensions.
    Extension(&'static [&'static str]),
    /// Always matches.
    Any,
}

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(values) => values.iter().any(|v| *v == path),
            PathPattern::Prefix(prefixes) => prefixes.iter().any(|p| path.starts_with(p)),
            PathPattern::Extension(exts) => extension(path)
                .map(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
            PathPattern::Any => true,
        }
    }
}

/// Extension of the last segment, without the dot.
fn extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}
