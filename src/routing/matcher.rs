//! Path matching.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Exact matchers ignore the query; prefix matchers see it, since the proxy
//!   target after `/http/` carries its own query
//! - No regex to guarantee O(n) matching

/// A condition on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatcher {
    /// Path (without query) equals the value.
    Exact(&'static str),
    /// Path-and-query starts with the value.
    Prefix(&'static str),
}

impl PathMatcher {
    /// Returns the remainder after the matched part, if the path matches.
    pub fn strip<'a>(&self, path_and_query: &'a str) -> Option<&'a str> {
        match self {
            PathMatcher::Exact(expected) => {
                let path = path_and_query
                    .split_once('?')
                    .map(|(path, _)| path)
                    .unwrap_or(path_and_query);
                (path == *expected).then_some("")
            }
            PathMatcher::Prefix(prefix) => path_and_query.strip_prefix(prefix),
        }
    }

    pub fn matches(&self, path_and_query: &str) -> bool {
        self.strip(path_and_query).is_some()
    }
}
