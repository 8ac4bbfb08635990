//! Pattern compilation and priority calculation for routes
//!
//! Pure parsers that transform pattern strings into ordered segment lists.
//! All functions are **pure**: same input → same output, no side effects.

use std::collections::HashSet;

use super::pattern::{classify_segment, Param, Segment};
use crate::error::{Result, RouteError};

/// The pattern string that marks a fallback route
pub const FALLBACK_PATTERN: &str = "*";

/// A route pattern compiled into an immutable, ordered list of segments
///
/// Compiling is deterministic: the same string always yields a structurally
/// equal value, independent of any request state.
///
/// # Examples
///
/// ```
/// use waypost_router::CompiledPattern;
///
/// let pattern = CompiledPattern::compile("/users/[id]").unwrap();
/// assert_eq!(pattern.segments().len(), 2);
/// assert_eq!(pattern, CompiledPattern::compile("/users/[id]").unwrap());
///
/// assert!(CompiledPattern::compile("/users/[id").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    source: String,
    segments: Vec<Segment>,
    fallback: bool,
}

impl CompiledPattern {
    /// Compiles a pattern string, rejecting malformed syntax
    pub fn compile(pattern: &str) -> Result<Self> {
        compile_pattern(pattern)
    }

    /// The original pattern string
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this is the `"*"` fallback pattern
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// All parameters in positional order
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.segments.iter().flat_map(Segment::params)
    }

    /// Matcher keys referenced anywhere in the pattern
    pub fn matcher_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params()
            .filter_map(|p| p.matcher.as_deref().map(|key| (p.name.as_str(), key)))
    }

    /// Matching priority, lower is tried first
    pub fn priority(&self) -> usize {
        calculate_priority(self)
    }
}

/// Compiles a pattern string into a [`CompiledPattern`] (pure function)
///
/// Empty segments are ignored, so `/users/`, `users` and `//users` compile
/// identically. Duplicate parameter names are rejected because they would
/// silently overwrite each other in the result map.
pub fn compile_pattern(pattern: &str) -> Result<CompiledPattern> {
    if pattern.trim() == FALLBACK_PATTERN {
        return Ok(CompiledPattern {
            source: pattern.to_string(),
            segments: Vec::new(),
            fallback: true,
        });
    }

    let segments = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| classify_segment(pattern, segment))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    for param in segments.iter().flat_map(Segment::params) {
        if !seen.insert(param.name.as_str()) {
            return Err(RouteError::compile(
                pattern,
                format!("parameter `{}` is declared more than once", param.name),
            ));
        }
    }

    tracing::trace!(pattern, segments = segments.len(), "compiled route pattern");

    Ok(CompiledPattern {
        source: pattern.to_string(),
        segments,
        fallback: false,
    })
}

/// Calculates route priority for matching order (pure function)
///
/// Lower number = higher priority (matched first).
///
/// # Priority Order
///
/// 1. **Static routes** → 0
/// 2. **Dynamic routes** → 1-999
/// 3. **Required catch-all** → 1000+
/// 4. **Optional catch-all** → 2000+
/// 5. **Fallback** → `usize::MAX`
///
/// # Examples
///
/// ```
/// use waypost_router::CompiledPattern;
///
/// let priority = |p: &str| CompiledPattern::compile(p).unwrap().priority();
///
/// assert_eq!(priority("/users/new"), 0);
/// assert_eq!(priority("/users/[id]"), 4); // 1 + 2 + 1
/// assert_eq!(priority("/docs/[...slug]"), 1002);
/// assert_eq!(priority("/docs/[[...slug]]"), 2002);
/// ```
pub fn calculate_priority(pattern: &CompiledPattern) -> usize {
    if pattern.fallback {
        return usize::MAX;
    }

    let segments = &pattern.segments;
    let depth = segments.len();

    if segments.iter().any(|s| matches!(s, Segment::CatchAll(_))) {
        return 1000 + depth;
    }
    if segments.iter().any(|s| matches!(s, Segment::OptionalCatchAll(_))) {
        return 2000 + depth;
    }

    let dynamic_count = segments
        .iter()
        .filter(|s| !matches!(s, Segment::Static(_)))
        .count();

    if dynamic_count == 0 {
        return 0;
    }

    let optional_bonus = if segments.iter().any(Segment::is_optional) { 0 } else { 1 };
    dynamic_count + depth + optional_bonus
}
