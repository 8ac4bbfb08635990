//! Integration tests for the route table

use pretty_assertions::assert_eq;
use waypost_router::*;

fn site() -> Router {
    Router::new()
        .with_matchers(Matchers::builtin())
        .with_routes([
            Route::new("/").unwrap().with_name("home"),
            Route::new("/users/new").unwrap(),
            Route::new("/users/[id=number]").unwrap().with_name("user.show"),
            Route::new("/docs/[[...slug]]").unwrap().with_name("docs"),
            Route::new("/[...rest]").unwrap(),
            Route::new("*").unwrap(),
        ])
}

#[test]
fn test_routes_sorted_by_priority() {
    let router = site();
    let sources: Vec<&str> = router.routes().iter().map(|r| r.pattern.source()).collect();
    assert_eq!(
        sources,
        vec!["/", "/users/new", "/users/[id=number]", "/[...rest]", "/docs/[[...slug]]"]
    );
    assert_eq!(router.fallbacks().len(), 1);
}

#[test]
fn test_match_prefers_more_specific_route() {
    let router = site();

    let m = router.match_route("/users/new").unwrap().unwrap();
    assert_eq!(m.route.pattern.source(), "/users/new");

    let m = router.match_route("/users/42").unwrap().unwrap();
    assert_eq!(m.param("id"), Some(&ParamValue::from("42")));

    // predicate rejects, catch-all takes it
    let m = router.match_route("/users/abc").unwrap().unwrap();
    assert_eq!(m.route.pattern.source(), "/[...rest]");
    assert_eq!(m.param("rest"), Some(&ParamValue::from(vec!["users", "abc"])));
}

#[test]
fn test_fallback_used_only_when_nothing_matches() {
    let router = Router::new()
        .with_route(Route::new("/about").unwrap())
        .with_route(Route::new("*").unwrap());

    let scope = MatchScope::new();
    let m = router.match_route_in("/about", &scope).unwrap().unwrap();
    assert!(!m.route.fallback);
    assert!(scope.has_matched());

    let scope = MatchScope::new();
    let m = router.match_route_in("/nowhere", &scope).unwrap().unwrap();
    assert!(m.route.fallback);
    assert!(!scope.has_matched());
}

#[test]
fn test_prefix_route() {
    let router = Router::new().with_route(Route::new("/admin").unwrap().with_exact(false));
    assert!(router.match_route("/admin/settings").unwrap().is_some());
    assert!(router.match_route("/public").unwrap().is_none());
}

#[test]
fn test_url_generation() {
    let router = site();

    assert_eq!(router.url_for_params("home", &[]), Some("/".to_string()));
    assert_eq!(
        router.url_for_params("user.show", &[("id", "7")]),
        Some("/users/7".to_string())
    );
    assert_eq!(router.url_for_params("user.show", &[]), None);
    assert_eq!(
        router.url_for("docs", &Params::from([("slug", vec!["a b", "c"])])),
        Some("/docs/a%20b/c".to_string())
    );
    assert_eq!(router.url_for("docs", &Params::new()), Some("/docs".to_string()));
    assert_eq!(router.url_for("missing", &Params::new()), None);
}

#[test]
fn test_generated_url_matches_back() {
    let router = site();
    let url = router.url_for_params("user.show", &[("id", "99")]).unwrap();
    let m = router.match_route(&url).unwrap().unwrap();
    assert_eq!(m.route.name.as_deref(), Some("user.show"));
    assert_eq!(m.params.get_str("id"), Some("99"));
}

#[test]
fn test_route_metadata() {
    let route = Route::new("/dashboard").unwrap().with_meta("auth", "required");
    assert_eq!(route.get_meta("auth").map(String::as_str), Some("required"));
    assert_eq!(route.get_meta("title"), None);
}
