//! The segment matcher the dispatcher consults on cache misses.
//!
//! Patterns are split on `/`; a segment written `{name}` captures one
//! non-empty path segment, every other segment must match literally. The
//! trailing slash is significant, `/foo` and `/foo/` are different patterns.

use log::debug;

use crate::router::action::RouteArgs;

/// Index of a compiled route in the dispatcher's table.
pub type RouteKey = usize;

/// What the matcher knows about a (method, path) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Found(RouteKey, RouteArgs),
    NotFound,
    /// The path exists under these methods only.
    MethodNotAllowed(Vec<String>),
}

/// A URL-pattern matcher built once from the full route list.
pub trait Matcher: Send + Sync {
    fn dispatch(&self, method: &str, path: &str) -> MatchOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug)]
struct Pattern {
    method: String,
    segments: Vec<Segment>,
    key: RouteKey,
}

impl Pattern {
    fn parse(method: &str, uri: &str, key: RouteKey) -> Self {
        let segments = uri
            .split('/')
            .map(|segment| {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                    _ => Segment::Literal(segment.to_string()),
                }
            })
            .collect();
        Self { method: method.to_string(), segments, key }
    }

    fn capture(&self, path: &str) -> Option<RouteArgs> {
        let mut args = RouteArgs::new();
        let mut parts = path.split('/');
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Param(name) if !part.is_empty() => {
                    args.insert(name.clone(), part.to_string());
                }
                _ => return None,
            }
        }
        match parts.next() {
            Some(_) => None,
            None => Some(args),
        }
    }
}

/// Linear matcher over `{name}` patterns, first registration wins.
///
/// `HEAD` requests fall back to `GET` routes when no `HEAD` route matches.
#[derive(Debug, Default)]
pub struct SegmentMatcher {
    patterns: Vec<Pattern>,
}

impl SegmentMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, method: &str, uri: &str, key: RouteKey) {
        debug!("Matcher pattern {method} {uri} -> #{key}");
        self.patterns.push(Pattern::parse(method, uri, key));
    }

    fn find(&self, method: &str, path: &str) -> Result<(RouteKey, RouteArgs), Vec<String>> {
        let mut others: Vec<String> = Vec::new();
        let mut get_fallback = None;
        for pattern in &self.patterns {
            let Some(args) = pattern.capture(path) else {
                continue;
            };
            if pattern.method == method {
                return Ok((pattern.key, args));
            }
            if method == "HEAD" && pattern.method == "GET" && get_fallback.is_none() {
                get_fallback = Some((pattern.key, args));
                continue;
            }
            if !others.contains(&pattern.method) {
                others.push(pattern.method.clone());
            }
        }
        get_fallback.ok_or(others)
    }
}

impl Matcher for SegmentMatcher {
    fn dispatch(&self, method: &str, path: &str) -> MatchOutcome {
        match self.find(method, path) {
            Ok((key, args)) => MatchOutcome::Found(key, args),
            Err(others) if others.is_empty() => MatchOutcome::NotFound,
            Err(others) => MatchOutcome::MethodNotAllowed(others),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> SegmentMatcher {
        let mut matcher = SegmentMatcher::new();
        matcher.add("GET", "/users/{id}", 0);
        matcher.add("DELETE", "/users/{id}", 1);
        matcher.add("GET", "/users/{id}/posts/{post}", 2);
        matcher.add("GET", "/", 3);
        matcher.add("GET", "/foo", 4);
        matcher
    }

    #[test]
    fn test_captures_placeholders() {
        match matcher().dispatch("GET", "/users/7/posts/hello") {
            MatchOutcome::Found(2, args) => {
                assert_eq!(args["id"], "7");
                assert_eq!(args["post"], "hello");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_placeholder_needs_a_value() {
        assert_eq!(matcher().dispatch("GET", "/users/"), MatchOutcome::NotFound);
    }

    #[test]
    fn test_trailing_slash_is_significant() {
        assert!(matches!(matcher().dispatch("GET", "/foo"), MatchOutcome::Found(4, _)));
        assert_eq!(matcher().dispatch("GET", "/foo/"), MatchOutcome::NotFound);
        assert!(matches!(matcher().dispatch("GET", "/"), MatchOutcome::Found(3, _)));
    }

    #[test]
    fn test_other_methods_reported_in_registration_order() {
        assert_eq!(
            matcher().dispatch("PUT", "/users/7"),
            MatchOutcome::MethodNotAllowed(vec!["GET".to_string(), "DELETE".to_string()])
        );
    }

    #[test]
    fn test_head_falls_back_to_get() {
        assert!(matches!(matcher().dispatch("HEAD", "/foo"), MatchOutcome::Found(4, _)));
    }
}
