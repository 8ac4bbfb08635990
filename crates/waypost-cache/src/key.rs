//! Cache key canonicalization
//!
//! A [`CacheKey`] is an ordered list of primitive parts. Its canonical form is
//! the compact JSON array of those parts, which keeps types apart (`"1"` vs
//! `1`), keeps part boundaries apart (`["a/b"]` vs `["a", "b"]`) and is
//! sensitive to order. The canonical string is both the storage key and the
//! lock-table key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One primitive element of a structured cache key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&KeyPart> for Value {
    fn from(part: &KeyPart) -> Self {
        match part {
            KeyPart::Null => Value::Null,
            KeyPart::Bool(b) => Value::Bool(*b),
            KeyPart::Int(n) => Value::from(*n),
            KeyPart::Float(f) if f.is_finite() => Value::from(*f),
            // JSON has no NaN or infinity; an object never collides with another part
            KeyPart::Float(f) => serde_json::json!({ "float": f.to_string() }),
            KeyPart::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        KeyPart::Float(value)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(KeyPart::Null, Into::into)
    }
}

/// Canonical string for an ordered list of key parts (pure function)
///
/// # Examples
///
/// ```
/// use waypost_cache::key::{canonicalize, KeyPart};
///
/// assert_eq!(canonicalize(&["user".into(), 42.into()]), r#"["user",42]"#);
/// assert_ne!(
///     canonicalize(&["1".into()]),
///     canonicalize(&[1.into()]),
/// );
/// ```
pub fn canonicalize(parts: &[KeyPart]) -> String {
    Value::Array(parts.iter().map(Value::from).collect()).to_string()
}

/// Structured cache key with its canonical string computed once
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    parts: Vec<KeyPart>,
    canonical: String,
}

impl CacheKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        let canonical = canonicalize(&parts);
        Self { parts, canonical }
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// The canonical string used for storage and locking
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

impl<T: Into<KeyPart>> FromIterator<T> for CacheKey {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<KeyPart>, const N: usize> From<[T; N]> for CacheKey {
    fn from(parts: [T; N]) -> Self {
        parts.into_iter().collect()
    }
}

impl<T: Into<KeyPart>> From<Vec<T>> for CacheKey {
    fn from(parts: Vec<T>) -> Self {
        parts.into_iter().collect()
    }
}

impl From<&str> for CacheKey {
    fn from(part: &str) -> Self {
        Self::new(vec![part.into()])
    }
}

impl From<String> for CacheKey {
    fn from(part: String) -> Self {
        Self::new(vec![part.into()])
    }
}

/// Builds a [`CacheKey`] from parts of mixed primitive types
///
/// ```
/// use waypost_cache::cache_key;
///
/// let key = cache_key!["posts", 2024, true];
/// assert_eq!(key.as_str(), r#"["posts",2024,true]"#);
/// ```
#[macro_export]
macro_rules! cache_key {
    ($($part:expr),* $(,)?) => {
        $crate::key::CacheKey::new(vec![$($crate::key::KeyPart::from($part)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_canonical_is_order_sensitive() {
        let a = CacheKey::from(["a", "b"]);
        let b = CacheKey::from(["b", "a"]);
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_canonical_keeps_part_boundaries() {
        let joined = CacheKey::from(["a/b"]);
        let split = CacheKey::from(["a", "b"]);
        assert_ne!(joined.as_str(), split.as_str());
    }

    #[test]
    fn test_canonical_keeps_types_apart() {
        assert_ne!(cache_key!["1"].as_str(), cache_key![1].as_str());
        assert_ne!(cache_key!["true"].as_str(), cache_key![true].as_str());
        assert_ne!(cache_key!["null"].as_str(), cache_key![None::<i64>].as_str());
    }

    #[test]
    fn test_canonical_escapes_quotes() {
        let key = cache_key![r#"a","b"#];
        assert_ne!(key.as_str(), CacheKey::from(["a", "b"]).as_str());
    }

    #[test]
    fn test_canonical_is_deterministic() {
        let parts = vec![KeyPart::from("user"), KeyPart::from(7), KeyPart::from(1.5)];
        assert_eq!(canonicalize(&parts), canonicalize(&parts.clone()));
        assert_eq!(canonicalize(&parts), r#"["user",7,1.5]"#);
    }

    #[rstest]
    #[case(cache_key!["posts"], r#"["posts"]"#)]
    #[case(cache_key!["user", 7], r#"["user",7]"#)]
    #[case(cache_key![true, None::<i64>], r#"[true,null]"#)]
    #[case(cache_key!["a b", -1], r#"["a b",-1]"#)]
    fn test_canonical_form(#[case] key: CacheKey, #[case] expected: &str) {
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn test_non_finite_floats_have_their_own_keys() {
        let nan = cache_key![f64::NAN];
        assert_ne!(nan.as_str(), cache_key![None::<i64>].as_str());
        assert_ne!(nan.as_str(), cache_key!["NaN"].as_str());
        assert_eq!(nan.as_str(), r#"[{"float":"NaN"}]"#);

        assert_ne!(cache_key![f64::INFINITY].as_str(), cache_key![f64::NEG_INFINITY].as_str());
        assert_eq!(cache_key![f64::INFINITY].as_str(), r#"[{"float":"inf"}]"#);
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(CacheKey::new(Vec::new()).as_str(), "[]");
    }
}
