//! Outbound request construction.
//!
//! # Responsibilities
//! - Mirror an inbound request onto a backend target
//! - Classify methods into bodiless and entity-bearing sets
//! - Apply the header forwarding policy (filter lists, Referer
//!   translation, X-Forwarded-For synthesis, Host preservation)
//! - Track the logical URI (cache key) apart from the dialed target
//!
//! # Design Decisions
//! - Unknown methods are rejected with a tagged error, not passed through
//! - The logical URI carries the inbound host so a shared cache sees one
//!   entry regardless of which physical backend serves it
//! - Cookies cross the boundary verbatim: lenient, browser-shaped values
//!   must survive, so nothing here parses or validates them

use std::net::IpAddr;

use axum::body::Body;
use axum::http::uri::Uri;
use axum::http::{header, request, HeaderMap, HeaderValue, Method, Request};
use bytes::Bytes;
use url::Url;

use crate::driver::DriverConfig;
use crate::error::GatewayError;
use crate::http::uri::{rewrite_uri, translate_url};

/// Methods built without an entity.
const SIMPLE_METHODS: [&str; 5] = ["GET", "HEAD", "OPTIONS", "TRACE", "DELETE"];

/// Methods that copy the inbound body.
const ENTITY_METHODS: [&str; 9] = [
    "POST", "PUT", "PROPFIND", "PROPPATCH", "MKCOL", "COPY", "MOVE", "LOCK", "UNLOCK",
];

/// The inbound request, reduced to what rewriting and routing need.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Absolute form: `scheme://host/path?query`.
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<IpAddr>,
    pub body: Bytes,
}

impl InboundRequest {
    /// Build from axum request parts, reconstructing the absolute URI from
    /// the Host header when the request line is in origin form.
    pub fn from_parts(
        parts: &request::Parts,
        remote_addr: Option<IpAddr>,
        body: Bytes,
    ) -> Result<Self, GatewayError> {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_owned()))
            .ok_or_else(|| {
                GatewayError::UriTranslation("request carries no Host header".into())
            })?;
        let scheme = parts.uri.scheme_str().unwrap_or("http");
        let uri = rewrite_uri(&parts.uri, scheme, &host)?;

        Ok(Self {
            method: parts.method.clone(),
            uri,
            headers: parts.headers.clone(),
            remote_addr,
            body,
        })
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    /// Host (with port when present) as the client addressed it.
    pub fn host(&self) -> &str {
        self.uri.authority().map(|a| a.as_str()).unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// A constructed outbound request plus its bookkeeping.
#[derive(Debug)]
pub struct OutboundRequest {
    /// What the transport sends; its URI is the physical dial target.
    pub request: Request<Body>,
    /// The physical backend target, kept for redirect resolution.
    pub target: Url,
    /// Target rewritten to the inbound host. Cache key; the value every
    /// component other than the transport sees.
    pub logical_uri: Uri,
    /// Fragment fetches follow redirects; proxied requests never do.
    pub follow_redirects: bool,
    /// `METHOD logical-uri` for warn-level failure logs.
    pub request_line: String,
}

/// Build the outbound request for `target`.
///
/// `backend_base` and `proxy_base` delimit the two URI namespaces for
/// Referer translation. `proxy_mode` keeps the inbound method and returns
/// redirects untouched; fragment mode always issues GET.
pub fn build_outbound(
    inbound: &InboundRequest,
    target: &Url,
    backend_base: &Url,
    proxy_base: &Url,
    proxy_mode: bool,
    config: &DriverConfig,
) -> Result<OutboundRequest, GatewayError> {
    let method_name = if proxy_mode {
        inbound.method.as_str().to_ascii_uppercase()
    } else {
        "GET".to_owned()
    };

    let body = if SIMPLE_METHODS.contains(&method_name.as_str()) {
        Body::empty()
    } else if ENTITY_METHODS.contains(&method_name.as_str()) {
        Body::from(inbound.body.clone())
    } else {
        return Err(GatewayError::UnsupportedMethod {
            method: method_name,
            uri: target.to_string(),
        });
    };

    let target_uri: Uri = target
        .as_str()
        .parse()
        .map_err(|e| GatewayError::UriTranslation(format!("{target}: {e}")))?;
    let logical_uri = rewrite_uri(&target_uri, inbound.scheme(), inbound.host())?;

    // The transport dials the request URI; an outbound proxy replaces the
    // backend as the dial target while Host keeps addressing the backend.
    let dial_uri = match &config.proxy {
        Some(proxy) => rewrite_uri(&target_uri, "http", &proxy.authority())?,
        None => target_uri.clone(),
    };

    let method = Method::from_bytes(method_name.as_bytes()).map_err(|_| {
        GatewayError::UnsupportedMethod {
            method: method_name.clone(),
            uri: target.to_string(),
        }
    })?;
    let request_line = format!("{method} {logical_uri}");

    let mut request = Request::builder()
        .method(method)
        .uri(dial_uri)
        .body(body)
        .map_err(|e| GatewayError::UriTranslation(format!("{target}: {e}")))?;

    copy_request_headers(inbound, backend_base, proxy_base, config, request.headers_mut())?;

    let host_value = if config.preserve_host {
        inbound.host().to_owned()
    } else {
        target_authority(target)
    };
    if let Ok(value) = HeaderValue::from_str(&host_value) {
        request.headers_mut().insert(header::HOST, value);
    }

    if let Some(proxy) = &config.proxy {
        if let Some(credentials) = proxy.basic_credentials() {
            if let Ok(value) = HeaderValue::from_str(&credentials) {
                request
                    .headers_mut()
                    .insert(header::PROXY_AUTHORIZATION, value);
            }
        }
    }

    Ok(OutboundRequest {
        request,
        target: target.clone(),
        logical_uri,
        follow_redirects: !proxy_mode,
        request_line,
    })
}

fn copy_request_headers(
    inbound: &InboundRequest,
    backend_base: &Url,
    proxy_base: &Url,
    config: &DriverConfig,
    out: &mut HeaderMap,
) -> Result<(), GatewayError> {
    let filter = &config.request_headers;
    let mut forwarded_for_seen = false;

    for (name, value) in inbound.headers.iter() {
        if name == header::HOST {
            continue;
        }
        if name == header::USER_AGENT {
            // Set distinctly: some backends vary content and scripts on it.
            if filter.contains(name.as_str()) {
                out.insert(header::USER_AGENT, value.clone());
            }
        } else if name == header::REFERER {
            if filter.contains(name.as_str()) {
                let referer = value.to_str().map_err(|_| {
                    GatewayError::UriTranslation("Referer is not valid UTF-8".into())
                })?;
                let translated = translate_url(referer, proxy_base, backend_base)?;
                let value = HeaderValue::from_str(&translated).map_err(|_| {
                    GatewayError::UriTranslation(format!("bad Referer: {translated}"))
                })?;
                out.insert(header::REFERER, value);
            }
        } else if filter.contains(name.as_str()) {
            if name == "x-forwarded-for" {
                forwarded_for_seen = true;
            }
            out.append(name.clone(), value.clone());
        }
    }

    // Missing and not blocked: synthesize from the caller's address.
    if !forwarded_for_seen && filter.contains("x-forwarded-for") {
        if let Some(addr) = inbound.remote_addr {
            if let Ok(value) = HeaderValue::from_str(&addr.to_string()) {
                out.insert("x-forwarded-for", value);
            }
        }
    }

    Ok(())
}

fn target_authority(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_owned(),
    }
}
