//! Route pattern module
//!
//! Contains the pure pattern compiler: segment classification and whole
//! pattern compilation. Nothing in here touches request state.

pub mod parser;
pub mod pattern;

pub use parser::{calculate_priority, compile_pattern, CompiledPattern, FALLBACK_PATTERN};
pub use pattern::{classify_segment, parse_param, CompoundPart, CompoundSegment, Param, Segment};
