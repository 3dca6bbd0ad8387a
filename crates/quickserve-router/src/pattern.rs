//! Route patterns.
//!
//! A pattern is a `/`-delimited list of segments:
//!
//! - `users` matches the literal text `users`
//! - `:id` matches any single segment and captures it as `id`
//! - `*` matches the rest of the path, captures it as `wildcard`, and ends
//!   the comparison
//!
//! Empty segments are ignored on both sides, so `/users/` and `users` are the
//! same path.

use crate::params::{Params, WILDCARD};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
    has_wildcard: bool,
}

/// Splits a path into its non-empty segments.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Pattern {
    /// Parses a pattern.
    pub fn parse(raw: &str) -> Self {
        let segments: Vec<Segment> = split_path(raw)
            .map(|s| {
                if s == "*" {
                    Segment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        let has_wildcard = segments.contains(&Segment::Wildcard);
        Self {
            raw: raw.to_string(),
            segments,
            has_wildcard,
        }
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `path` against this pattern, returning the captures.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() && !self.has_wildcard {
            return None;
        }

        let mut params = Params::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard => {
                    let rest = parts.get(i..).map(|rest| rest.join("/")).unwrap_or_default();
                    params.push(WILDCARD, rest);
                    return Some(params);
                }
                Segment::Param(name) => params.push(name.as_str(), *parts.get(i)?),
                Segment::Literal(expected) => {
                    if *parts.get(i)? != expected.as_str() {
                        return None;
                    }
                }
            }
        }
        Some(params)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Joins a group prefix and a pattern with exactly one `/` between them.
pub(crate) fn join(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let pattern = pattern.trim_start_matches('/');
    match (prefix.is_empty(), pattern.is_empty()) {
        (true, _) => format!("/{pattern}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{pattern}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let pattern = Pattern::parse("/users/active");
        assert!(pattern.matches("/users/active").is_some());
        assert!(pattern.matches("/users/active/").is_some());
        assert!(pattern.matches("/users/inactive").is_none());
        assert!(pattern.matches("/users").is_none());
    }

    #[test]
    fn test_param_capture() {
        let params = Pattern::parse("/users/:id/posts/:post")
            .matches("/users/7/posts/99")
            .unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("post"), Some("99"));
    }

    #[test]
    fn test_wildcard_captures_remainder() {
        let params = Pattern::parse("/files/*").matches("/files/x/y/z").unwrap();
        assert_eq!(params.wildcard(), Some("x/y/z"));
    }

    #[test]
    fn test_wildcard_may_capture_nothing() {
        let params = Pattern::parse("/files/*").matches("/files").unwrap();
        assert_eq!(params.wildcard(), Some(""));
        assert!(Pattern::parse("/files/x/*").matches("/files").is_none());
    }

    #[test]
    fn test_bare_wildcard_matches_everything() {
        let pattern = Pattern::parse("*");
        assert_eq!(pattern.matches("/").unwrap().wildcard(), Some(""));
        assert_eq!(pattern.matches("/a/b").unwrap().wildcard(), Some("a/b"));
    }

    #[test]
    fn test_root() {
        let pattern = Pattern::parse("/");
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("").is_some());
        assert!(pattern.matches("/a").is_none());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/api/", "/users"), "/api/users");
        assert_eq!(join("/api", "/"), "/api");
        assert_eq!(join("", "users"), "/users");
    }
}
