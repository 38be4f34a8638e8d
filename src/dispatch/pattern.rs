//! Route patterns and path matching.
//!
//! A pattern is written `METHOD/segment/{variable}/...`. Matching is a
//! positional comparison over a fixed number of segments: there are no
//! wildcards and no trailing catch-all.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::dispatch::error::PatternError;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the input segment exactly.
    Literal(String),
    /// Matches any non-empty input segment and binds it under this name.
    Variable(String),
}

/// A parsed route pattern: a method token and an ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    method: String,
    segments: Vec<Segment>,
}

/// Path variables bound by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars(HashMap<String, String>);

impl PathVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Split a request path into segments. One leading `/` is ignored.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

impl RoutePattern {
    /// The method token this pattern accepts.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a method and path against this pattern.
    ///
    /// Returns the bound variables on success. A failed match never returns
    /// partial bindings.
    pub fn match_route(&self, method: &str, path: &str) -> Option<PathVars> {
        if self.method != method {
            return None;
        }
        self.bind(path)
    }

    /// Check only the segment shape of `path`, ignoring the method.
    pub fn match_path(&self, path: &str) -> bool {
        self.bind(path).is_some()
    }

    fn bind(&self, path: &str) -> Option<PathVars> {
        let inputs: Vec<&str> = split_path(path).collect();
        if inputs.len() != self.segments.len() {
            return None;
        }

        let mut vars = PathVars::new();
        for (segment, input) in self.segments.iter().zip(inputs) {
            match segment {
                Segment::Literal(literal) if literal == input => {}
                Segment::Variable(name) if !input.is_empty() => vars.insert(name.as_str(), input),
                _ => return None,
            }
        }
        Some(vars)
    }
}

impl FromStr for RoutePattern {
    type Err = PatternError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        let slash = pattern
            .find('/')
            .ok_or_else(|| PatternError::MissingPath(pattern.to_string()))?;
        let (method, path) = pattern.split_at(slash);
        if method.is_empty() {
            return Err(PatternError::MissingMethod(pattern.to_string()));
        }

        let mut segments = Vec::new();
        for raw in split_path(path) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some("") => return Err(PatternError::EmptyVariable(pattern.to_string())),
                Some(name) => {
                    let taken = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Variable(existing) if existing == name));
                    if taken {
                        return Err(PatternError::DuplicateVariable {
                            name: name.to_string(),
                            pattern: pattern.to_string(),
                        });
                    }
                    Segment::Variable(name.to_string())
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            method: method.to_string(),
            segments,
        })
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)?;
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => write!(f, "/{literal}")?,
                Segment::Variable(name) => write!(f, "/{{{name}}}")?,
            }
        }
        Ok(())
    }
}
