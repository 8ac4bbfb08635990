//! Route matching against compiled patterns
//!
//! The walk is a small backtracking search over (segment, path cursor)
//! pairs. Patterns only ever have a handful of segments, so trying each
//! distribution of optional and catch-all segments is cheap and keeps the
//! rules easy to read:
//!
//! - optional parameters try binding first, then skipping
//! - catch-alls try the longest slice first, always leaving room for the
//!   segments that the rest of the pattern still requires
//!
//! Only configuration problems are errors. A path that does not fit is `Ok(None)`,
//! and a pattern without parameters that fits yields an empty (non-`None`) map.

use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Result, RouteError};
use crate::path::split_path;
use crate::route::{CompiledPattern, Param, Segment};

/// A named predicate deciding whether a raw parameter value is acceptable
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Registry of matcher predicates referenced by `[name=matcherKey]`
///
/// # Examples
///
/// ```
/// use waypost_router::Matchers;
///
/// let matchers = Matchers::builtin().with("even", |v| {
///     v.parse::<u64>().map(|n| n % 2 == 0).unwrap_or(false)
/// });
///
/// assert!(matchers.contains("number"));
/// assert!(matchers.contains("even"));
/// ```
#[derive(Clone, Default)]
pub struct Matchers {
    predicates: HashMap<String, Predicate>,
}

impl Matchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matchers for common parameter shapes
    ///
    /// - `number` / `int` - one or more ASCII digits
    /// - `alpha` - alphabetic characters
    /// - `alphanum` - alphanumeric characters
    /// - `slug` - lowercase ASCII letters, digits and `-`
    /// - `uuid` - 8-4-4-4-12 hexadecimal groups
    pub fn builtin() -> Self {
        Self::new()
            .with("number", is_number)
            .with("int", is_number)
            .with("alpha", |v| !v.is_empty() && v.chars().all(char::is_alphabetic))
            .with("alphanum", |v| !v.is_empty() && v.chars().all(char::is_alphanumeric))
            .with("slug", |v| {
                !v.is_empty()
                    && v.chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            })
            .with("uuid", is_uuid)
    }

    /// Adds a predicate (builder style)
    pub fn with<F>(mut self, key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.insert(key, predicate);
        self
    }

    pub fn insert<F>(&mut self, key: impl Into<String>, predicate: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(key.into(), Arc::new(predicate));
    }

    /// Copies every predicate from `other`, replacing ones with the same key
    pub fn extend(&mut self, other: &Matchers) {
        self.predicates
            .extend(other.predicates.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
    }

    pub fn get(&self, key: &str) -> Option<&Predicate> {
        self.predicates.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.predicates.contains_key(key)
    }

    /// Fails on the first matcher key the pattern uses but this registry lacks
    pub fn check(&self, pattern: &CompiledPattern) -> Result<()> {
        pattern
            .matcher_keys()
            .find(|(_, key)| !self.contains(key))
            .map_or(Ok(()), |(param, key)| {
                Err(RouteError::UnknownMatcher {
                    param: param.to_string(),
                    matcher: key.to_string(),
                })
            })
    }
}

impl fmt::Debug for Matchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.predicates.keys().collect();
        keys.sort();
        f.debug_struct("Matchers").field("keys", &keys).finish()
    }
}

fn is_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

fn is_uuid(value: &str) -> bool {
    UUID_REGEX.is_match(value)
}

/// Per-request record of whether any ordinary route has already matched
///
/// Owned by the request-handling layer; one instance per logical request,
/// never shared across requests. Fallback routes read it, and the caller
/// marks it after a successful non-fallback match.
#[derive(Debug, Default)]
pub struct MatchScope {
    matched: AtomicBool,
}

impl MatchScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_matched(&self) -> bool {
        self.matched.load(Ordering::Acquire)
    }

    pub fn mark_matched(&self) {
        self.matched.store(true, Ordering::Release);
    }
}

/// Options controlling a single match
///
/// # Examples
///
/// ```
/// use waypost_router::{match_path, MatchOptions};
///
/// let prefix = MatchOptions::new();
/// assert!(match_path("/users", "/users/123", &prefix).unwrap().is_some());
///
/// let exact = MatchOptions::new().exact();
/// assert!(match_path("/users", "/users/123", &exact).unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Require the whole path to be consumed
    pub exact: bool,
    /// Only match when no ordinary route matched earlier in the request
    pub fallback: bool,
    /// Predicates for `[name=matcherKey]` parameters
    pub matchers: Matchers,
    /// Request-scoped match state consulted by fallback matching
    pub scope: Option<Arc<MatchScope>>,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(self) -> Self {
        self.with_exact(true)
    }

    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_matchers(mut self, matchers: Matchers) -> Self {
        self.matchers = matchers;
        self
    }

    pub fn with_matcher<F>(mut self, key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.matchers.insert(key, predicate);
        self
    }

    pub fn with_scope(mut self, scope: Arc<MatchScope>) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// A bound parameter: one path segment, or the list bound by a catch-all
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            ParamValue::Many(_) => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[String]> {
        match self {
            ParamValue::Single(_) => None,
            ParamValue::Many(values) => Some(values),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Single(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::Many(values)
    }
}

/// Parameters extracted by a successful match
///
/// An empty map means "matched, nothing to bind" and is distinct from no match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params(HashMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Value of a single-segment parameter
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Segments bound by a catch-all parameter
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(ParamValue::as_slice)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, ParamValue> {
        self.0.iter()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from(entries: [(K, V); N]) -> Self {
        Params(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = hash_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl CompiledPattern {
    /// Matches a request path against this pattern
    ///
    /// # Errors
    ///
    /// [`RouteError::UnknownMatcher`] when the pattern references a matcher
    /// key missing from `options.matchers`.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypost_router::{CompiledPattern, MatchOptions, Params};
    ///
    /// let pattern = CompiledPattern::compile("/users/[id]").unwrap();
    /// let params = pattern.matches("/users/123", &MatchOptions::new()).unwrap();
    /// assert_eq!(params, Some(Params::from([("id", "123")])));
    /// ```
    pub fn matches(&self, path: &str, options: &MatchOptions) -> Result<Option<Params>> {
        self.match_with(
            path,
            options.exact,
            options.fallback,
            &options.matchers,
            options.scope.as_deref(),
        )
    }

    pub(crate) fn match_with(
        &self,
        path: &str,
        exact: bool,
        fallback: bool,
        matchers: &Matchers,
        scope: Option<&MatchScope>,
    ) -> Result<Option<Params>> {
        matchers.check(self)?;

        if self.is_fallback() || fallback {
            if scope.is_some_and(MatchScope::has_matched) {
                tracing::trace!(pattern = self.source(), "fallback skipped, request already matched");
                return Ok(None);
            }
            if self.is_fallback() {
                return Ok(Some(Params::new()));
            }
        }

        let segments = split_path(path);
        let raw: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();

        let walk = Walk {
            segments: self.segments(),
            path: &raw,
            exact,
            matchers,
        };

        let mut params = Params::new();
        Ok(walk.step(0, 0, &mut params).then_some(params))
    }
}

/// Compiles `pattern` and matches `path` against it
///
/// Convenience for one-off matches; hold on to a [`CompiledPattern`] (or use
/// a [`Router`](crate::Router)) when the same pattern is matched repeatedly.
///
/// # Examples
///
/// ```
/// use waypost_router::{match_path, MatchOptions, Params};
///
/// let options = MatchOptions::new();
/// assert_eq!(match_path("/users", "/users", &options).unwrap(), Some(Params::new()));
/// assert_eq!(match_path("/users/[id]", "/users", &options).unwrap(), None);
/// ```
pub fn match_path(pattern: &str, path: &str, options: &MatchOptions) -> Result<Option<Params>> {
    CompiledPattern::compile(pattern)?.matches(path, options)
}

struct Walk<'a> {
    segments: &'a [Segment],
    path: &'a [&'a str],
    exact: bool,
    matchers: &'a Matchers,
}

impl Walk<'_> {
    /// Tries to match `segments[si..]` against `path[pi..]`, binding into `params`
    ///
    /// On failure every binding made by this call has been removed again.
    fn step(&self, si: usize, pi: usize, params: &mut Params) -> bool {
        let Some(segment) = self.segments.get(si) else {
            return !self.exact || pi == self.path.len();
        };
        let current = self.path.get(pi).copied();

        match segment {
            Segment::Static(text) => current == Some(text.as_str()) && self.step(si + 1, pi + 1, params),

            Segment::Dynamic(param) => match current {
                Some(value) if self.accepts(param, value) => {
                    params.insert(&param.name, value);
                    self.step(si + 1, pi + 1, params) || self.unbind(params, [param])
                }
                _ => false,
            },

            Segment::OptionalDynamic(param) => {
                if let Some(value) = current.filter(|v| self.accepts(param, v)) {
                    params.insert(&param.name, value);
                    if self.step(si + 1, pi + 1, params) {
                        return true;
                    }
                    params.remove(&param.name);
                }
                self.step(si + 1, pi, params)
            }

            Segment::CatchAll(param) | Segment::OptionalCatchAll(param) => {
                let min = usize::from(matches!(segment, Segment::CatchAll(_)));
                let remaining = self.path.len() - pi;
                let Some(max) = remaining.checked_sub(self.reserved_after(si)) else {
                    return false;
                };

                for take in (min..=max).rev() {
                    let slice = &self.path[pi..pi + take];
                    if !slice.iter().all(|value| self.accepts(param, value)) {
                        continue;
                    }
                    params.insert(&param.name, slice.to_vec());
                    if self.step(si + 1, pi + take, params) {
                        return true;
                    }
                    params.remove(&param.name);
                }
                false
            }

            Segment::Compound(compound) => {
                let Some(values) = current.and_then(|raw| compound.capture(raw)) else {
                    return false;
                };
                let bound: Vec<(&Param, &str)> = compound.params().zip(values).collect();
                if !bound.iter().all(|(param, value)| self.accepts(param, value)) {
                    return false;
                }
                for (param, value) in &bound {
                    params.insert(&param.name, *value);
                }
                self.step(si + 1, pi + 1, params)
                    || self.unbind(params, bound.iter().map(|(param, _)| *param))
            }
        }
    }

    /// Number of path segments the pattern needs after segment `si`
    fn reserved_after(&self, si: usize) -> usize {
        self.segments[si + 1..]
            .iter()
            .filter(|s| !s.is_optional())
            .count()
    }

    fn accepts(&self, param: &Param, value: &str) -> bool {
        match &param.matcher {
            None => true,
            Some(key) => self.matchers.get(key).is_some_and(|predicate| predicate(value)),
        }
    }

    /// Removes bindings after a failed branch; always reports failure
    fn unbind<'p>(&self, params: &mut Params, bound: impl IntoIterator<Item = &'p Param>) -> bool {
        for param in bound {
            params.remove(&param.name);
        }
        false
    }
}
