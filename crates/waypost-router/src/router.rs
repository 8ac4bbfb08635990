//! Route table: priority-ordered matching, fallbacks and URL generation

use std::collections::HashMap;

use crate::error::Result;
use crate::matcher::{MatchScope, Matchers, ParamValue, Params};
use crate::route::{CompiledPattern, CompoundPart, Segment};

/// A compiled pattern plus the options it is matched with
#[derive(Debug, Clone)]
pub struct Route {
    /// Compiled pattern
    pub pattern: CompiledPattern,
    /// Whether the whole path must be consumed (default: true)
    pub exact: bool,
    /// Only considered when no ordinary route matched the request
    pub fallback: bool,
    /// Priority for matching (lower = higher priority)
    pub priority: usize,
    /// Optional name for URL generation
    pub name: Option<String>,
    /// Arbitrary metadata for the route (titles, permissions, cache settings, etc.)
    pub metadata: HashMap<String, String>,
}

impl Route {
    /// Compiles `pattern` into a route
    ///
    /// The `"*"` pattern produces a fallback route.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypost_router::Route;
    ///
    /// let route = Route::new("/users/[id]").unwrap();
    /// assert_eq!(route.pattern.source(), "/users/[id]");
    /// assert!(route.exact);
    ///
    /// assert!(Route::new("*").unwrap().fallback);
    /// ```
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = CompiledPattern::compile(pattern)?;
        Ok(Route {
            exact: true,
            fallback: pattern.is_fallback(),
            priority: pattern.priority(),
            pattern,
            name: None,
            metadata: HashMap::new(),
        })
    }

    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Marks this route as a fallback for requests nothing else matched
    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn get_meta(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }

    /// Matches this route against a path
    ///
    /// `scope` is only consulted by fallback routes.
    pub fn matches(
        &self,
        path: &str,
        matchers: &Matchers,
        scope: Option<&MatchScope>,
    ) -> Result<Option<Params>> {
        self.pattern
            .match_with(path, self.exact, self.fallback, matchers, scope)
    }

    /// Generates a URL for this route by substituting parameters
    ///
    /// Required parameters must be present; absent optional ones are left
    /// out. Values are percent-encoded. Returns `None` for fallback routes or
    /// when a required parameter is missing or has the wrong shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypost_router::{Params, ParamValue, Route};
    ///
    /// let route = Route::new("/docs/[version]/[[...slug]]").unwrap();
    ///
    /// let params = Params::from([
    ///     ("version", ParamValue::from("v2")),
    ///     ("slug", ParamValue::from(vec!["guides", "intro"])),
    /// ]);
    /// assert_eq!(route.generate_url(&params).unwrap(), "/docs/v2/guides/intro");
    ///
    /// let params = Params::from([("version", "v2")]);
    /// assert_eq!(route.generate_url(&params).unwrap(), "/docs/v2");
    /// ```
    pub fn generate_url(&self, params: &Params) -> Option<String> {
        if self.pattern.is_fallback() {
            return None;
        }

        let mut segments: Vec<String> = Vec::new();

        for segment in self.pattern.segments() {
            match segment {
                Segment::Static(text) => segments.push(text.clone()),
                Segment::Dynamic(param) => segments.push(encode(params.get_str(&param.name)?)),
                Segment::OptionalDynamic(param) => {
                    if let Some(value) = params.get(&param.name) {
                        segments.push(encode(value.as_str()?));
                    }
                }
                Segment::CatchAll(param) => {
                    let values = params.get_all(&param.name).filter(|v| !v.is_empty())?;
                    segments.extend(values.iter().map(|v| encode(v)));
                }
                Segment::OptionalCatchAll(param) => {
                    if let Some(values) = params.get(&param.name) {
                        segments.extend(values.as_slice()?.iter().map(|v| encode(v)));
                    }
                }
                Segment::Compound(compound) => {
                    let joined = compound
                        .parts()
                        .iter()
                        .map(|part| match part {
                            CompoundPart::Literal(text) => Some(text.clone()),
                            CompoundPart::Param(param) => params.get_str(&param.name).map(encode),
                        })
                        .collect::<Option<String>>()?;
                    segments.push(joined);
                }
            }
        }

        Some(format!("/{}", segments.join("/")))
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Result of matching a route against a path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route
    pub route: Route,
    /// Extracted parameters from the path
    pub params: Params,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }
}

/// Router holding a priority-ordered set of routes
///
/// Ordinary routes are tried in priority order (static before dynamic before
/// catch-all); fallback routes are only tried when none of them matched.
///
/// # Examples
///
/// ```
/// use waypost_router::{Matchers, Route, Router};
///
/// let router = Router::new()
///     .with_matchers(Matchers::builtin())
///     .with_route(Route::new("/users/new").unwrap())
///     .with_route(Route::new("/users/[id=number]").unwrap().with_name("user.show"))
///     .with_route(Route::new("*").unwrap());
///
/// let m = router.match_route("/users/123").unwrap().unwrap();
/// assert_eq!(m.params.get_str("id"), Some("123"));
///
/// let m = router.match_route("/users/abc").unwrap().unwrap();
/// assert!(m.route.fallback);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    fallbacks: Vec<Route>,
    named_routes: HashMap<String, Route>,
    matchers: Matchers,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds matcher predicates available to every route, replacing same-named ones
    pub fn with_matchers(mut self, matchers: Matchers) -> Self {
        self.matchers.extend(&matchers);
        self
    }

    /// Adds a route; routes stay sorted by priority
    pub fn with_route(mut self, route: Route) -> Self {
        self.add_route(route);
        self
    }

    /// Adds multiple routes at once
    pub fn with_routes<I>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = Route>,
    {
        for route in routes {
            self.add_route(route);
        }
        self
    }

    pub fn add_route(&mut self, route: Route) {
        if let Some(ref name) = route.name {
            self.named_routes.insert(name.clone(), route.clone());
        }

        let bucket = if route.fallback {
            &mut self.fallbacks
        } else {
            &mut self.routes
        };
        bucket.push(route);
        // Stable sort keeps insertion order between equal priorities
        bucket.sort_by_key(|r| r.priority);
    }

    /// Removes every route with the given pattern source
    pub fn remove_route(&mut self, pattern: &str) {
        self.routes.retain(|r| r.pattern.source() != pattern);
        self.fallbacks.retain(|r| r.pattern.source() != pattern);
        self.named_routes.retain(|_, r| r.pattern.source() != pattern);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn fallbacks(&self) -> &[Route] {
        &self.fallbacks
    }

    /// Matches a path using a fresh request scope
    pub fn match_route(&self, path: &str) -> Result<Option<RouteMatch>> {
        self.match_route_in(path, &MatchScope::new())
    }

    /// Matches a path within an existing request scope
    ///
    /// A successful ordinary match marks `scope`, so fallbacks consulted
    /// later in the same request (by this or another router) stay silent.
    pub fn match_route_in(&self, path: &str, scope: &MatchScope) -> Result<Option<RouteMatch>> {
        for route in &self.routes {
            if let Some(params) = route.matches(path, &self.matchers, Some(scope))? {
                scope.mark_matched();
                return Ok(Some(RouteMatch {
                    route: route.clone(),
                    params,
                }));
            }
        }

        for route in &self.fallbacks {
            if let Some(params) = route.matches(path, &self.matchers, Some(scope))? {
                return Ok(Some(RouteMatch {
                    route: route.clone(),
                    params,
                }));
            }
        }

        Ok(None)
    }

    /// Generates a URL for a named route
    ///
    /// # Examples
    ///
    /// ```
    /// use waypost_router::{Params, Route, Router};
    ///
    /// let router = Router::new()
    ///     .with_route(Route::new("/posts/[year]/[slug]").unwrap().with_name("post.show"));
    ///
    /// let params = Params::from([("year", "2024"), ("slug", "hello world")]);
    /// assert_eq!(
    ///     router.url_for("post.show", &params).unwrap(),
    ///     "/posts/2024/hello%20world"
    /// );
    /// ```
    pub fn url_for(&self, name: &str, params: &Params) -> Option<String> {
        self.named_routes
            .get(name)
            .and_then(|route| route.generate_url(params))
    }

    /// Convenience for [`url_for`](Self::url_for) with single-segment parameters
    pub fn url_for_params(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        let params = params
            .iter()
            .fold(Params::new(), |mut acc, (k, v)| {
                acc.insert(*k, *v);
                acc
            });
        self.url_for(name, &params)
    }

    pub fn get_route_by_name(&self, name: &str) -> Option<&Route> {
        self.named_routes.get(name)
    }
}
