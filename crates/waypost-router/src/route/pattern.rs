//! Pattern parsing for route segments
//!
//! Pure parsing of a single `/`-delimited pattern segment into a typed
//! [`Segment`]. All functions are **pure**: same input → same output, no side effects.
//!
//! # Segment syntax
//!
//! | Syntax              | Segment                          |
//! |---------------------|----------------------------------|
//! | `about`             | [`Segment::Static`]              |
//! | `[id]`              | [`Segment::Dynamic`]             |
//! | `[[id]]`            | [`Segment::OptionalDynamic`]     |
//! | `[...slug]`         | [`Segment::CatchAll`]            |
//! | `[[...slug]]`       | [`Segment::OptionalCatchAll`]    |
//! | `[id=number]`       | any of the above, predicate-bound |
//! | `[id]-[name]`       | [`Segment::Compound`]            |
//! | `{[id]}`            | [`Segment::Static`] with text `[id]` |

use regex::Regex;

use crate::error::{Result, RouteError};

/// A named parameter, optionally bound to a matcher predicate key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub matcher: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matcher: None,
        }
    }

    pub fn with_matcher(mut self, matcher: impl Into<String>) -> Self {
        self.matcher = Some(matcher.into());
        self
    }
}

/// One piece of a compound segment such as `USER-[id]` or `[id]-[name]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompoundPart {
    Literal(String),
    Param(Param),
}

/// A segment mixing literal text with one or more required parameters
///
/// The parts are resolved against a single path segment with one anchored
/// regular expression built at compile time. Parameters capture lazily, so
/// `[id]-[name]` splits `7-red-shoes` into `7` and `red-shoes`.
#[derive(Debug, Clone)]
pub struct CompoundSegment {
    parts: Vec<CompoundPart>,
    regex: Regex,
}

impl CompoundSegment {
    fn new(pattern: &str, parts: Vec<CompoundPart>) -> Result<Self> {
        // `s` lets captures span decoded newlines, as plain parameters do
        let source = parts.iter().fold(String::from("(?s)^"), |mut acc, part| {
            match part {
                CompoundPart::Literal(text) => acc.push_str(&regex::escape(text)),
                CompoundPart::Param(_) => acc.push_str("(.+?)"),
            }
            acc
        }) + "$";

        let regex = Regex::new(&source)
            .map_err(|err| RouteError::compile(pattern, format!("bad compound segment: {err}")))?;

        Ok(Self { parts, regex })
    }

    pub fn parts(&self) -> &[CompoundPart] {
        &self.parts
    }

    /// Parameters in left-to-right order
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.parts.iter().filter_map(|part| match part {
            CompoundPart::Param(param) => Some(param),
            CompoundPart::Literal(_) => None,
        })
    }

    /// Splits a raw path segment into one value per parameter
    pub(crate) fn capture<'a>(&self, raw: &'a str) -> Option<Vec<&'a str>> {
        let caps = self.regex.captures(raw)?;
        caps.iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str()))
            .collect()
    }
}

impl PartialEq for CompoundSegment {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for CompoundSegment {}

/// Represents the different kinds of compiled route pattern segments
///
/// Literal-escaped segments (`{[id]}`, `{...}`) compile to `Static` holding
/// the unescaped text, so they only ever match verbatim.
///
/// # Examples
///
/// ```
/// use waypost_router::route::pattern::{classify_segment, Segment};
///
/// let seg = classify_segment("/about", "about").unwrap();
/// assert!(matches!(seg, Segment::Static(_)));
///
/// let seg = classify_segment("/users/[id]", "[id]").unwrap();
/// assert!(matches!(seg, Segment::Dynamic(_)));
///
/// let seg = classify_segment("/docs/[[...slug]]", "[[...slug]]").unwrap();
/// assert!(matches!(seg, Segment::OptionalCatchAll(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, matched byte-for-byte after percent-decoding
    Static(String),
    /// `[name]` - exactly one path segment
    Dynamic(Param),
    /// `[[name]]` - zero or one path segment
    OptionalDynamic(Param),
    /// `[...name]` - one or more path segments
    CatchAll(Param),
    /// `[[...name]]` - zero or more path segments
    OptionalCatchAll(Param),
    /// Literal text and parameters sharing one path segment
    Compound(CompoundSegment),
}

impl Segment {
    /// Parameters bound by this segment
    pub fn params(&self) -> Vec<&Param> {
        match self {
            Segment::Static(_) => Vec::new(),
            Segment::Dynamic(p)
            | Segment::OptionalDynamic(p)
            | Segment::CatchAll(p)
            | Segment::OptionalCatchAll(p) => vec![p],
            Segment::Compound(compound) => compound.params().collect(),
        }
    }

    /// Whether the segment can match without consuming any path segment
    pub fn is_optional(&self) -> bool {
        matches!(self, Segment::OptionalDynamic(_) | Segment::OptionalCatchAll(_))
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Segment::CatchAll(_) | Segment::OptionalCatchAll(_))
    }
}

/// Lexical pieces of a single segment before classification
#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Param {
        param: Param,
        optional: bool,
        catch_all: bool,
    },
}

/// Classifies a raw pattern segment into a [`Segment`] (pure function)
///
/// `pattern` is the full pattern string and is only used for error messages.
///
/// # Parsing Rules
///
/// 1. `{...}` escapes are copied into the surrounding literal text
/// 2. `[[...name]]` / `[[name]]` are optional parts
/// 3. `[...name]` / `[name]` are required parts
/// 4. `name=key` binds a part to a matcher predicate
/// 5. More than one part, or literal text next to a part, forms a compound
///    segment; compound parts must be required single-segment parameters
pub fn classify_segment(pattern: &str, segment: &str) -> Result<Segment> {
    let mut tokens = tokenize(pattern, segment)?;

    if tokens.len() == 1 {
        return Ok(match tokens.remove(0) {
            Token::Text(text) => Segment::Static(text),
            Token::Param {
                param,
                optional,
                catch_all,
            } => match (optional, catch_all) {
                (false, false) => Segment::Dynamic(param),
                (true, false) => Segment::OptionalDynamic(param),
                (false, true) => Segment::CatchAll(param),
                (true, true) => Segment::OptionalCatchAll(param),
            },
        });
    }

    if tokens.is_empty() {
        return Err(RouteError::compile(pattern, "empty segment"));
    }

    let mut parts = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Text(text) => parts.push(CompoundPart::Literal(text)),
            Token::Param {
                param,
                optional: false,
                catch_all: false,
            } => {
                if matches!(parts.last(), Some(CompoundPart::Param(_))) {
                    return Err(RouteError::compile(
                        pattern,
                        format!("parameters in `{segment}` need a literal separator"),
                    ));
                }
                parts.push(CompoundPart::Param(param));
            }
            Token::Param { param, .. } => {
                return Err(RouteError::compile(
                    pattern,
                    format!(
                        "`{}` in `{segment}` must be a required parameter to share a segment",
                        param.name
                    ),
                ));
            }
        }
    }

    CompoundSegment::new(pattern, parts).map(Segment::Compound)
}

fn tokenize(pattern: &str, segment: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = segment;

    while let Some(c) = rest.chars().next() {
        match c {
            '{' => {
                let end = rest.find('}').ok_or_else(|| {
                    RouteError::compile(pattern, format!("unclosed `{{` in `{segment}`"))
                })?;
                let escaped = &rest[1..end];
                if escaped.contains('{') {
                    return Err(RouteError::compile(
                        pattern,
                        format!("nested `{{` in `{segment}`"),
                    ));
                }
                text.push_str(escaped);
                rest = &rest[end + 1..];
            }
            '[' => {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                let (token, consumed) = parse_bracket(pattern, segment, rest)?;
                tokens.push(token);
                rest = &rest[consumed..];
            }
            ']' | '}' => {
                return Err(RouteError::compile(
                    pattern,
                    format!("unbalanced `{c}` in `{segment}`"),
                ));
            }
            _ => {
                text.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }

    Ok(tokens)
}

/// Parses a bracketed part at the start of `rest`, returning it with the
/// number of bytes consumed
fn parse_bracket(pattern: &str, segment: &str, rest: &str) -> Result<(Token, usize)> {
    let unclosed = || RouteError::compile(pattern, format!("unclosed `[` in `{segment}`"));

    let (inner, optional, consumed) = match rest.strip_prefix("[[") {
        Some(after) => {
            let end = after.find("]]").ok_or_else(unclosed)?;
            (&after[..end], true, end + 4)
        }
        None => {
            let after = &rest[1..];
            let end = after.find(']').ok_or_else(unclosed)?;
            (&after[..end], false, end + 2)
        }
    };

    if inner.contains(['[', ']', '{', '}']) {
        return Err(RouteError::compile(
            pattern,
            format!("nested brackets in `{segment}`"),
        ));
    }

    let (body, catch_all) = match inner.strip_prefix("...") {
        Some(body) => (body, true),
        None => (inner, false),
    };

    let param = parse_param(pattern, body)?;

    Ok((
        Token::Param {
            param,
            optional,
            catch_all,
        },
        consumed,
    ))
}

/// Parses `name` or `name=matcherKey` (pure function)
///
/// # Examples
///
/// ```
/// use waypost_router::route::pattern::{parse_param, Param};
///
/// assert_eq!(parse_param("/x", "id").unwrap(), Param::new("id"));
/// assert_eq!(
///     parse_param("/x", "id=number").unwrap(),
///     Param::new("id").with_matcher("number")
/// );
/// assert!(parse_param("/x", "").is_err());
/// ```
pub fn parse_param(pattern: &str, body: &str) -> Result<Param> {
    let (name, matcher) = match body.split_once('=') {
        Some((name, matcher)) => (name, Some(matcher)),
        None => (body, None),
    };

    if name.is_empty() {
        return Err(RouteError::compile(pattern, "parameter name is empty"));
    }

    match matcher {
        Some("") => Err(RouteError::compile(
            pattern,
            format!("matcher key for `{name}` is empty"),
        )),
        Some(key) => Ok(Param::new(name).with_matcher(key)),
        None => Ok(Param::new(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(segment: &str) -> Segment {
        classify_segment("/test", segment).unwrap()
    }

    #[test]
    fn test_classify_static() {
        assert_eq!(classify("about"), Segment::Static("about".to_string()));
    }

    #[test]
    fn test_classify_dynamic() {
        assert_eq!(classify("[id]"), Segment::Dynamic(Param::new("id")));
    }

    #[test]
    fn test_classify_dynamic_with_matcher() {
        assert_eq!(
            classify("[id=number]"),
            Segment::Dynamic(Param::new("id").with_matcher("number"))
        );
    }

    #[test]
    fn test_classify_optional() {
        assert_eq!(classify("[[id]]"), Segment::OptionalDynamic(Param::new("id")));
    }

    #[test]
    fn test_classify_catch_all() {
        assert_eq!(classify("[...slug]"), Segment::CatchAll(Param::new("slug")));
    }

    #[test]
    fn test_classify_optional_catch_all_with_matcher() {
        assert_eq!(
            classify("[[...slug=alpha]]"),
            Segment::OptionalCatchAll(Param::new("slug").with_matcher("alpha"))
        );
    }

    #[test]
    fn test_classify_escaped_brackets_are_static() {
        assert_eq!(classify("{[id]}"), Segment::Static("[id]".to_string()));
        assert_eq!(classify("{...}rest"), Segment::Static("...rest".to_string()));
    }

    #[test]
    fn test_classify_compound() {
        let Segment::Compound(compound) = classify("USER-[userId]") else {
            panic!("expected compound segment");
        };
        assert_eq!(
            compound.parts(),
            &[
                CompoundPart::Literal("USER-".to_string()),
                CompoundPart::Param(Param::new("userId")),
            ]
        );
        assert_eq!(compound.capture("USER-123"), Some(vec!["123"]));
        assert_eq!(compound.capture("USR-123"), None);
    }

    #[test]
    fn test_compound_captures_lazily() {
        let Segment::Compound(compound) = classify("[id]-[name]-[suffix]") else {
            panic!("expected compound segment");
        };
        assert_eq!(compound.capture("1-two-three-4"), Some(vec!["1", "two", "three-4"]));
        assert_eq!(compound.capture("1-two"), None);
    }

    #[test]
    fn test_compound_escapes_regex_metacharacters() {
        let Segment::Compound(compound) = classify("v1.[minor]") else {
            panic!("expected compound segment");
        };
        assert_eq!(compound.capture("v1.2"), Some(vec!["2"]));
        assert_eq!(compound.capture("v1x2"), None);
    }

    #[test]
    fn test_classify_rejects_malformed_brackets() {
        for bad in ["[id", "id]", "[[id]", "[a]]", "[]", "[...]", "[[]]", "[a[b]]", "{x", "x}", "[id=]"] {
            assert!(
                classify_segment("/test", bad).is_err(),
                "`{bad}` should not compile"
            );
        }
    }

    #[test]
    fn test_classify_rejects_optional_inside_compound() {
        assert!(classify_segment("/test", "a-[[b]]").is_err());
        assert!(classify_segment("/test", "a-[...b]").is_err());
    }

    #[test]
    fn test_classify_rejects_adjacent_params() {
        assert!(classify_segment("/test", "[a][b]").is_err());
    }
}
