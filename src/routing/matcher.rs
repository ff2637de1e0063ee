//! Route matching logic.
//!
//! # Responsibilities
//! - Parse route path patterns (exact or trailing-wildcard prefix)
//! - Match request paths and methods against them
//! - Compute the path remainder that gets spliced onto a target path
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A wildcard is only legal as the final character
//! - Prefix patterns match whole segments: `/api/*` matches `/api` and
//!   `/api/x`, never `/apix`

use std::fmt;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a path pattern is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("path pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("path pattern '{0}' may only use '*' as its final character")]
    MisplacedWildcard(String),
}

/// A compiled route path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches one path exactly.
    Exact(String),
    /// Matches a path and everything below it. Stored without the wildcard
    /// and without a trailing slash; the root wildcard is the empty string.
    Prefix(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        match pattern.find('*') {
            None => Ok(PathPattern::Exact(pattern.to_string())),
            Some(idx) if idx == pattern.len() - 1 => {
                let base = pattern[..idx].trim_end_matches('/');
                Ok(PathPattern::Prefix(base.to_string()))
            }
            Some(_) => Err(PatternError::MisplacedWildcard(pattern.to_string())),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, PathPattern::Exact(_))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => p == path,
            PathPattern::Prefix(base) => {
                path == base
                    || (path.starts_with(base.as_str()) && path[base.len()..].starts_with('/'))
            }
        }
    }

    /// The part of `path` below the pattern's literal prefix.
    ///
    /// Only meaningful for paths this pattern matches.
    pub fn remainder<'a>(&self, path: &'a str) -> &'a str {
        match self {
            PathPattern::Exact(_) => "",
            PathPattern::Prefix(base) => path.get(base.len()..).unwrap_or(""),
        }
    }

    /// The literal part of the pattern, used as the default forward target.
    pub fn literal(&self) -> &str {
        match self {
            PathPattern::Exact(p) | PathPattern::Prefix(p) => p,
        }
    }
}

/// Method filter of a route: one method, or any.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RouteMethod {
    #[default]
    Any,
    Exact(Method),
}

impl RouteMethod {
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Exact(m) => m == method,
        }
    }
}

impl TryFrom<String> for RouteMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let upper = value.trim().to_ascii_uppercase();
        match upper.as_str() {
            "*" | "ALL" | "ANY" => Ok(RouteMethod::Any),
            _ => Method::from_bytes(upper.as_bytes())
                .map(RouteMethod::Exact)
                .map_err(|_| format!("invalid HTTP method '{value}'")),
        }
    }
}

impl From<RouteMethod> for String {
    fn from(value: RouteMethod) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Any => write!(f, "ALL"),
            RouteMethod::Exact(m) => write!(f, "{m}"),
        }
    }
}
