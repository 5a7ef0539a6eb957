//! Pooled outbound HTTP client.
//!
//! # Responsibilities
//! - Execute outbound requests through a pooled, TLS-capable client
//! - Bound concurrent backend connections and wait with a timeout
//! - Map every transport failure to a synthesized response
//! - Follow redirects for fragment fetches only
//! - Consult the shared cache before dialing when enabled
//!
//! # Design Decisions
//! - `execute` is total: the caller always receives a well-formed
//!   response, never a transport error
//! - The synthesized (status, reason) table is part of the external
//!   contract; each mapping is logged at warn with the request line
//! - No retries here; recovery policy belongs to callers or the cache

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::Semaphore;
use url::Url;

use crate::driver::DriverConfig;
use crate::error::GatewayError;
use crate::http::cache::HttpCache;
use crate::http::request::OutboundRequest;
use crate::http::response::rewrite_headers;
use crate::http::uri::rewrite_uri;

const MAX_REDIRECTS: usize = 10;

/// Marks a response as synthesized from a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFailure {
    pub reason: &'static str,
}

/// Reason string of a synthesized failure response, if any.
pub fn failure_reason<B>(response: &Response<B>) -> Option<&'static str> {
    response
        .extensions()
        .get::<TransportFailure>()
        .map(|failure| failure.reason)
}

/// Pooled client plus the per-driver execution policy around it.
pub struct OutboundClient {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    permits: Semaphore,
    pool_timeout: Duration,
    socket_timeout: Duration,
    cache: Option<HttpCache>,
}

impl OutboundClient {
    pub fn new(config: &DriverConfig) -> Result<Self, GatewayError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.connect_timeout));
        let tls = hyper_tls::native_tls::TlsConnector::new()
            .map_err(|e| GatewayError::Configuration(format!("TLS setup failed: {e}")))?;
        let connector = HttpsConnector::from((http, tls.into()));

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build(connector);

        Ok(Self {
            client,
            permits: Semaphore::new(config.max_connections_per_host),
            pool_timeout: config.connect_timeout,
            socket_timeout: config.socket_timeout,
            cache: config.use_cache.then(HttpCache::new),
        })
    }

    /// Execute an outbound request; always yields a response.
    ///
    /// Headers of the returned response are already rewritten into the
    /// proxy namespace delimited by the two base URLs.
    pub async fn execute(
        &self,
        outbound: OutboundRequest,
        config: &DriverConfig,
        backend_base: &Url,
        proxy_base: &Url,
    ) -> Response<Body> {
        let cache_key = outbound.logical_uri.to_string();
        let is_get = outbound.request.method() == Method::GET;

        if is_get {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(&cache_key) {
                    tracing::debug!(uri = %cache_key, "Cache hit");
                    let mut response = Response::new(Body::from(hit.body));
                    *response.status_mut() = hit.status;
                    *response.headers_mut() = hit.headers;
                    return response;
                }
            }
        }

        let request_line = outbound.request_line.clone();
        let _permit = match tokio::time::timeout(self.pool_timeout, self.permits.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return synthesize(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error retrieving URL",
                    &request_line,
                )
            }
            Err(_) => {
                return synthesize(
                    StatusCode::GATEWAY_TIMEOUT,
                    "Connection pool timeout",
                    &request_line,
                )
            }
        };

        let follow_redirects = outbound.follow_redirects;
        let mut target = outbound.target.clone();
        let mut request = outbound.request;
        let mut hops = 0;

        let response = loop {
            // The client consumes the request; keep what a redirect needs.
            let resend_headers = request.headers().clone();
            let attempt =
                match tokio::time::timeout(self.socket_timeout, self.client.request(request))
                    .await
                {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => {
                        let (status, reason) = classify_transport_error(&e);
                        return synthesize(status, reason, &request_line);
                    }
                    Err(_) => {
                        return synthesize(
                            StatusCode::GATEWAY_TIMEOUT,
                            "Socket timeout",
                            &request_line,
                        )
                    }
                };

            if follow_redirects && attempt.status().is_redirection() && hops < MAX_REDIRECTS {
                if let Some(next) = redirect_target(&attempt, &target) {
                    if let Some(redirected) =
                        self.redirect_request(&resend_headers, &next, config)
                    {
                        hops += 1;
                        tracing::debug!(location = %next, "Following redirect");
                        target = next;
                        request = redirected;
                        continue;
                    }
                }
            }
            break attempt;
        };

        let (parts, body) = response.into_parts();
        let body = match tokio::time::timeout(self.socket_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(_)) => {
                return synthesize(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error retrieving URL",
                    &request_line,
                )
            }
            Err(_) => {
                return synthesize(StatusCode::GATEWAY_TIMEOUT, "Socket timeout", &request_line)
            }
        };

        let headers = match rewrite_headers(&parts.headers, backend_base, proxy_base, config) {
            Ok(headers) => headers,
            Err(e) => {
                tracing::warn!(request = %request_line, error = %e, "Response rewrite failed");
                return synthesize(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error retrieving URL",
                    &request_line,
                );
            }
        };

        if is_get {
            if let Some(cache) = &self.cache {
                cache.store(&cache_key, parts.status, &headers, &body);
            }
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = headers;
        response
    }

    /// Build the follow-up GET for a redirect, keeping the prior headers.
    fn redirect_request(
        &self,
        previous_headers: &axum::http::HeaderMap,
        next: &Url,
        config: &DriverConfig,
    ) -> Option<Request<Body>> {
        let next_uri = next.as_str().parse().ok()?;
        let dial_uri = match &config.proxy {
            Some(proxy) => rewrite_uri(&next_uri, "http", &proxy.authority()).ok()?,
            None => next_uri,
        };

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(dial_uri)
            .body(Body::empty())
            .ok()?;
        for (name, value) in previous_headers {
            if name != header::HOST {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }
        let authority = match next.port() {
            Some(port) => format!("{}:{}", next.host_str().unwrap_or_default(), port),
            None => next.host_str().unwrap_or_default().to_owned(),
        };
        request
            .headers_mut()
            .insert(header::HOST, HeaderValue::from_str(&authority).ok()?);
        Some(request)
    }
}

impl std::fmt::Debug for OutboundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundClient")
            .field("pool_timeout", &self.pool_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

fn redirect_target<B>(response: &Response<B>, current: &Url) -> Option<Url> {
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    Url::options().base_url(Some(current)).parse(location).ok()
}

/// Total mapping from transport fault category to (status, reason).
fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> (StatusCode, &'static str) {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    (StatusCode::BAD_GATEWAY, "Connection refused")
                }
                std::io::ErrorKind::TimedOut => (StatusCode::GATEWAY_TIMEOUT, "Connect timeout"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving URL"),
            };
        }
        source = current.source();
    }
    (StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving URL")
}

fn synthesize(status: StatusCode, reason: &'static str, request_line: &str) -> Response<Body> {
    tracing::warn!(
        request = %request_line,
        status = status.as_u16(),
        reason,
        "Backend request failed"
    );
    let mut response = Response::new(Body::from(reason));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.extensions_mut().insert(TransportFailure { reason });
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_response_carries_reason() {
        let response = synthesize(StatusCode::BAD_GATEWAY, "Connection refused", "GET http://x/");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(failure_reason(&response), Some("Connection refused"));
    }

    #[test]
    fn test_redirect_target_resolves_relative_location() {
        let current = Url::parse("http://backend:8080/app/page").unwrap();
        let mut response = Response::new(());
        response
            .headers_mut()
            .insert(header::LOCATION, HeaderValue::from_static("/login"));
        let next = redirect_target(&response, &current).unwrap();
        assert_eq!(next.as_str(), "http://backend:8080/login");
    }
}
