//! URI mapping patterns.
//!
//! # Responsibilities
//! - Compile a `[scheme://host]/path-prefix` pattern string
//! - Match an inbound (scheme, host, path) triple
//!
//! # Design Decisions
//! - Scheme and host matching is case-insensitive; path is case-sensitive
//! - Absent scheme or host means "any"
//! - Host may carry a port; the comparison is on the literal authority
//! - Pure value: equality and hashing by the attribute tuple

use crate::error::GatewayError;

/// A compiled matcher over scheme, host and path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UriMapping {
    scheme: Option<String>,
    host: Option<String>,
    path: String,
}

impl UriMapping {
    /// Compile a pattern string.
    ///
    /// Accepted forms: `/path`, `scheme://host`, `scheme://host/path`,
    /// `*` (match everything). Scheme and host normalize to lowercase.
    pub fn compile(pattern: &str) -> Result<UriMapping, GatewayError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(GatewayError::Configuration(
                "empty uri mapping pattern".into(),
            ));
        }
        if pattern == "*" {
            return Ok(UriMapping {
                scheme: None,
                host: None,
                path: String::new(),
            });
        }
        if let Some(path) = pattern.strip_prefix('/') {
            return Ok(UriMapping {
                scheme: None,
                host: None,
                path: format!("/{path}"),
            });
        }

        let (scheme, rest) = pattern.split_once("://").ok_or_else(|| {
            GatewayError::Configuration(format!("invalid uri mapping pattern: {pattern}"))
        })?;
        if rest.is_empty() {
            return Err(GatewayError::Configuration(format!(
                "invalid uri mapping pattern: {pattern}"
            )));
        }
        let (host, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_owned()),
            None => (rest, String::new()),
        };

        Ok(UriMapping {
            scheme: match scheme {
                "*" => None,
                s => Some(s.to_ascii_lowercase()),
            },
            host: match host {
                "*" => None,
                h => Some(h.to_ascii_lowercase()),
            },
            path,
        })
    }

    /// The path prefix this mapping strips from matched requests.
    pub fn path_prefix(&self) -> &str {
        &self.path
    }

    /// Pure predicate: does an inbound (scheme, host, path) match?
    pub fn matches(&self, scheme: &str, host: &str, path: &str) -> bool {
        if let Some(expected) = &self.scheme {
            if !expected.eq_ignore_ascii_case(scheme) {
                return false;
            }
        }
        if let Some(expected) = &self.host {
            if !expected.eq_ignore_ascii_case(host) {
                return false;
            }
        }
        path.starts_with(&self.path)
    }
}

impl std::fmt::Display for UriMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme.as_deref().unwrap_or("*"),
            self.host.as_deref().unwrap_or("*"),
            self.path
        )
    }
}
