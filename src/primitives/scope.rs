//! Defines the scope set type and parsing/formatting according to the rfc.
use std::{fmt, str};

use serde::{Deserialize, Serialize};

/// An ordered set of scope tokens, as requested by a client or granted in a token.
///
/// Scope tokens are interpreted as a conjunction, i.e. a request is fulfilled only if every
/// one of its tokens is fulfilled. The insertion order of tokens is preserved since the first
/// token that fails a check determines the error reported to the client.
///
/// Scope tokens are restricted to the following subset of ascii:
///   - The character '!'
///   - The character range '\x23' to '\x5b' which includes numbers and upper case letters
///   - The character range '\x5d' to '\x7e' which includes lower case letters
/// Individual scope tokens are separated by spaces.
///
/// In particular, the characters '\x22' (`"`) and '\x5c' (`\`) are not allowed.
#[derive(Clone, Default)]
pub struct ScopeSet {
    tokens: Vec<String>,
}

/// Error returned from parsing a scope set as encoded in a request.
#[derive(Debug)]
pub enum ParseScopeErr {
    /// A character was encountered which is not allowed to appear in scope strings.
    InvalidCharacter(char),
}

impl ScopeSet {
    /// Create an empty scope set.
    pub fn new() -> ScopeSet {
        ScopeSet::default()
    }

    fn invalid_scope_char(ch: char) -> bool {
        match ch {
            '\x21' => false,
            ch if ('\x23'..='\x5b').contains(&ch) => false,
            ch if ('\x5d'..='\x7e').contains(&ch) => false,
            ' ' => false, // Space separator is a valid char
            _ => true,
        }
    }

    /// Add a scope token at the end of the set unless it is already present.
    pub fn insert(&mut self, token: &str) {
        if !self.contains(token) {
            self.tokens.push(token.to_string());
        }
    }

    /// Determine whether the named scope token is part of this set.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Determine if every token of this set also appears in `rhs`.
    ///
    /// A token issued with scopes `rhs` may access a resource requiring `self` iff this holds.
    pub fn subset_of(&self, rhs: &ScopeSet) -> bool {
        self.tokens.iter().all(|t| rhs.contains(t))
    }

    /// Whether the set contains no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The number of distinct scope tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Create an iterator over the individual scope tokens, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(AsRef::as_ref)
    }
}

impl str::FromStr for ScopeSet {
    type Err = ParseScopeErr;

    fn from_str(string: &str) -> Result<ScopeSet, ParseScopeErr> {
        if let Some(ch) = string.chars().find(|&ch| ScopeSet::invalid_scope_char(ch)) {
            return Err(ParseScopeErr::InvalidCharacter(ch));
        }

        let mut scope = ScopeSet::new();
        for token in string.split(' ').filter(|s| !s.is_empty()) {
            scope.insert(token);
        }
        Ok(scope)
    }
}

impl<'a> std::iter::FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut scope = ScopeSet::new();
        for token in iter {
            scope.insert(token);
        }
        scope
    }
}

/// Scope sets compare as sets, the insertion order does not influence equality.
impl PartialEq for ScopeSet {
    fn eq(&self, rhs: &ScopeSet) -> bool {
        self.tokens.len() == rhs.tokens.len() && self.subset_of(rhs)
    }
}

impl Eq for ScopeSet {}

impl fmt::Debug for ScopeSet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_tuple("ScopeSet").field(&self.tokens).finish()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.tokens.join(" "))
    }
}

impl fmt::Display for ParseScopeErr {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            ParseScopeErr::InvalidCharacter(chr) => {
                write!(fmt, "Encountered invalid character in scope: {}", chr)
            }
        }
    }
}

impl std::error::Error for ParseScopeErr {}

impl Serialize for ScopeSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string: String = Deserialize::deserialize(deserializer)?;
        str::FromStr::from_str(&string).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_roundtrip() {
        let scope: ScopeSet = "post_images annoy_friends".parse().unwrap();
        assert_eq!(scope.len(), 2);
        assert!(scope.contains("post_images"));
        assert!(scope.contains("annoy_friends"));

        let reparsed = scope.to_string().parse::<ScopeSet>().unwrap();
        assert_eq!(scope, reparsed);
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!("\"no quotes allowed\"".parse::<ScopeSet>().is_err());
        assert!("back\\slash".parse::<ScopeSet>().is_err());
    }

    #[test]
    fn preserves_request_order() {
        let scope: ScopeSet = "c a b a".parse().unwrap();
        let order: Vec<_> = scope.iter().collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn subset_comparison() {
        let granted: ScopeSet = "read write".parse().unwrap();
        let requested: ScopeSet = "read".parse().unwrap();
        let unrelated: ScopeSet = "read admin".parse().unwrap();

        assert!(requested.subset_of(&granted));
        assert!(!granted.subset_of(&requested));
        assert!(!unrelated.subset_of(&granted));
        assert!(ScopeSet::new().subset_of(&granted));
    }

    #[test]
    fn equality_ignores_order() {
        let one: ScopeSet = "a b".parse().unwrap();
        let two: ScopeSet = "b a".parse().unwrap();
        assert_eq!(one, two);
        assert_ne!(one, "a".parse().unwrap());
    }

    #[test]
    fn serialization_as_string() {
        let scope: ScopeSet = "one two".parse().unwrap();
        let json = serde_json::to_string(&scope).unwrap();
        let back: ScopeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(scope, back);
    }
}
