//! URI rewriting between the proxy and backend namespaces.
//!
//! # Responsibilities
//! - Rewrite an absolute URI onto a different scheme/authority
//! - Translate URI-bearing header values between two base URLs
//! - Strip embedded session identifiers from translated values
//!
//! # Design Decisions
//! - Translation is base-prefix substitution: a value under base A moves
//!   under base B with its remaining path and query untouched, so a
//!   round-trip through both namespaces restores the original
//! - Values outside the source namespace pass through unchanged

use axum::http::uri::Uri;
use url::Url;

use crate::error::GatewayError;

/// Rewrite `uri` onto `scheme://authority`, keeping path and query.
pub fn rewrite_uri(uri: &Uri, scheme: &str, authority: &str) -> Result<Uri, GatewayError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{scheme}://{authority}{path_and_query}")
        .parse::<Uri>()
        .map_err(|e| GatewayError::UriTranslation(format!("{uri}: {e}")))
}

/// Translate a URI-bearing value from the `from` namespace into `to`.
///
/// Relative values are resolved against `from` first. A value whose
/// resolved form lies under `from` is re-rooted under `to`; a value on the
/// same authority but outside the base path keeps its path and only swaps
/// scheme and authority; anything else is returned unchanged.
pub fn translate_url(value: &str, from: &Url, to: &Url) -> Result<String, GatewayError> {
    let resolved = Url::options()
        .base_url(Some(from))
        .parse(value)
        .map_err(|e| GatewayError::UriTranslation(format!("{value}: {e}")))?;

    if !same_origin(&resolved, from) {
        return Ok(value.to_owned());
    }

    let from_path = base_path(from);
    let to_path = base_path(to);

    let resolved_path = resolved.path();
    let translated_path = match strip_base(resolved_path, &from_path) {
        Some(rest) => format!("{}{}", to_path, rest),
        None => resolved_path.to_owned(),
    };

    let mut result = format!(
        "{}://{}{}",
        to.scheme(),
        authority_of(to),
        translated_path
    );
    if let Some(query) = resolved.query() {
        result.push('?');
        result.push_str(query);
    }
    if let Some(fragment) = resolved.fragment() {
        result.push('#');
        result.push_str(fragment);
    }
    Ok(result)
}

/// Strip an embedded `;jsessionid=...` path parameter.
pub fn remove_session_id(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    let Some(start) = lower.find(";jsessionid=") else {
        return value.to_owned();
    };
    let tail = &value[start..];
    let end = tail
        .find(['?', '#'])
        .map(|idx| start + idx)
        .unwrap_or(value.len());
    format!("{}{}", &value[..start], &value[end..])
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme().eq_ignore_ascii_case(b.scheme())
        && a.host_str()
            .unwrap_or_default()
            .eq_ignore_ascii_case(b.host_str().unwrap_or_default())
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Base path of a URL, without any trailing slash (`/` becomes empty).
fn base_path(url: &Url) -> String {
    url.path().trim_end_matches('/').to_owned()
}

fn strip_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    match path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

fn authority_of(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_owned(),
    }
}
