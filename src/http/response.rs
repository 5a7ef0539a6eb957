//! Backend response rewriting.
//!
//! # Responsibilities
//! - Filter response headers through the driver's response filter list
//! - Translate URI-bearing headers back into the proxy namespace
//! - Strip embedded session identifiers from translated values
//!
//! # Design Decisions
//! - Content-Encoding is always dropped; the body travels as the bytes
//!   the gateway read, re-encoding belongs to the outer layer
//! - A translation failure aborts the rewrite; the executor maps it to a
//!   synthesized 500 like any other retrieval failure

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use url::Url;

use crate::driver::DriverConfig;
use crate::error::GatewayError;
use crate::http::uri::{remove_session_id, translate_url};

/// Headers whose value is a URI and must change namespaces.
const URI_HEADERS: [&str; 4] = ["location", "content-location", "link", "p3p"];

/// Rewrite backend response headers for the original client.
pub fn rewrite_headers(
    headers: &HeaderMap,
    backend_base: &Url,
    proxy_base: &Url,
    config: &DriverConfig,
) -> Result<HeaderMap, GatewayError> {
    let filter = &config.response_headers;
    let mut out = HeaderMap::new();

    for (name, value) in headers.iter() {
        // Body bytes are forwarded as read; an encoding marker would lie.
        if name == "content-encoding" {
            continue;
        }
        if !filter.contains(name.as_str()) {
            continue;
        }

        if URI_HEADERS.contains(&name.as_str()) {
            let raw = value.to_str().map_err(|_| {
                GatewayError::UriTranslation(format!("header {name} is not valid UTF-8"))
            })?;
            let translated = remove_session_id(&translate_url(raw, backend_base, proxy_base)?);
            let value = HeaderValue::from_str(&translated).map_err(|_| {
                GatewayError::UriTranslation(format!("bad {name} value: {translated}"))
            })?;
            out.append(name.clone(), value);
        } else {
            out.append(name.clone(), value.clone());
        }
    }

    Ok(out)
}

/// Rebuild a backend response for the original client.
pub fn rewrite_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    backend_base: &Url,
    proxy_base: &Url,
    config: &DriverConfig,
) -> Result<Response<Body>, GatewayError> {
    let rewritten = rewrite_headers(headers, backend_base, proxy_base, config)?;
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = rewritten;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::filter::FilterList;

    fn bases() -> (Url, Url) {
        (
            Url::parse("http://backend:8080/").unwrap(),
            Url::parse("http://www.example.com/shop/").unwrap(),
        )
    }

    fn config() -> DriverConfig {
        DriverConfig::for_tests()
    }

    fn rewrite(headers: HeaderMap, config: &DriverConfig) -> Response<Body> {
        let (backend, proxy) = bases();
        rewrite_response(
            StatusCode::OK,
            &headers,
            Bytes::from_static(b"body"),
            &backend,
            &proxy,
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_content_encoding_is_always_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("content-encoding", HeaderValue::from_static("gzip"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        let response = rewrite(headers, &config());
        assert!(response.headers().get("content-encoding").is_none());
        assert_eq!(response.headers().get("content-type").unwrap(), "text/html");
    }

    #[test]
    fn test_location_is_translated_and_session_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "location",
            HeaderValue::from_static("http://backend:8080/login;jsessionid=9F1A?next=1"),
        );
        let response = rewrite(headers, &config());
        assert_eq!(
            response.headers().get("location").unwrap(),
            "http://www.example.com/shop/login?next=1"
        );
    }

    #[test]
    fn test_foreign_location_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "location",
            HeaderValue::from_static("http://elsewhere.org/page"),
        );
        let response = rewrite(headers, &config());
        assert_eq!(
            response.headers().get("location").unwrap(),
            "http://elsewhere.org/page"
        );
    }

    #[test]
    fn test_filtered_response_header_is_dropped() {
        let mut cfg = config();
        let mut filter = FilterList::allow_all();
        filter.set_discarded(["X-Internal"]);
        cfg.response_headers = filter;

        let mut headers = HeaderMap::new();
        headers.insert("x-internal", HeaderValue::from_static("secret"));
        headers.insert("x-public", HeaderValue::from_static("ok"));
        let response = rewrite(headers, &cfg);
        assert!(response.headers().get("x-internal").is_none());
        assert_eq!(response.headers().get("x-public").unwrap(), "ok");
    }

    #[test]
    fn test_bad_location_is_translation_error() {
        let (backend, proxy) = bases();
        let mut headers = HeaderMap::new();
        headers.insert("location", HeaderValue::from_static("http://[broken"));
        let result = rewrite_response(
            StatusCode::FOUND,
            &headers,
            Bytes::new(),
            &backend,
            &proxy,
            &config(),
        );
        assert!(result.is_err());
    }
}
