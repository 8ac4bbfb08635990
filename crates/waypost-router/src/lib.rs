//! # Waypost Router
//!
//! Declarative route patterns compiled once and matched against request paths:
//! - Static segments (`/about`)
//! - Dynamic parameters (`/users/[id]`)
//! - Optional parameters (`/users/[[id]]`)
//! - Catch-all routes (`/docs/[...slug]`, `/docs/[[...slug]]`)
//! - Compound segments (`/p/[id]-[name]`, `/u/USER-[id]`)
//! - Predicate-bound parameters (`/users/[id=number]`)
//! - Escaped literals (`/{[id]}`)
//! - Fallback routes (`*`) gated by per-request match state
//!
//! ## Result shape
//!
//! Matching returns `Ok(None)` when the path does not fit, and `Ok(Some(params))`
//! when it does. A pattern without parameters matches to an empty map, which
//! is *not* the same as no match. Only malformed patterns and unknown matcher
//! keys produce errors.
//!
//! ## Example
//!
//! ```
//! use waypost_router::{match_path, MatchOptions, Params, ParamValue};
//!
//! let options = MatchOptions::new().exact();
//!
//! let params = match_path("/docs/[...slug]", "/docs/a/b/c", &options).unwrap();
//! assert_eq!(params, Some(Params::from([("slug", vec!["a", "b", "c"])])));
//!
//! let params = match_path("/[[...a]]/b/[[...c]]", "/x/y/b/z", &options).unwrap().unwrap();
//! assert_eq!(params.get("a"), Some(&ParamValue::from(vec!["x", "y"])));
//! assert_eq!(params.get("c"), Some(&ParamValue::from(vec!["z"])));
//! ```

pub mod error;
mod matcher;
pub mod path;
pub mod route;
mod router;

pub use error::RouteError;
pub use matcher::{match_path, MatchOptions, MatchScope, Matchers, ParamValue, Params, Predicate};
pub use path::{is_valid_path, normalize_path, split_path};
pub use route::{compile_pattern, CompiledPattern, Param, Segment};
pub use router::{Route, RouteMatch, Router};
