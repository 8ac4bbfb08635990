//! Configuration errors raised by the pattern compiler and matcher
//!
//! A path that simply does not fit a pattern is never an error: matching
//! reports that as `Ok(None)`. Only malformed patterns and references to
//! unregistered matcher predicates end up here.

use thiserror::Error;

/// Errors produced while compiling or matching route patterns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The pattern string is malformed (unbalanced brackets, empty names, ...)
    #[error("invalid route pattern `{pattern}`: {reason}")]
    Compile { pattern: String, reason: String },

    /// A parameter references a matcher key that was not supplied
    #[error("parameter `{param}` references unknown matcher `{matcher}`")]
    UnknownMatcher { param: String, matcher: String },
}

impl RouteError {
    pub(crate) fn compile(pattern: &str, reason: impl Into<String>) -> Self {
        RouteError::Compile {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;
