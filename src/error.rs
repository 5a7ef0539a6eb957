//! Gateway error taxonomy.
//!
//! # Responsibilities
//! - Classify per-request failures (routing miss, bad method, bad URI)
//! - Classify static defects (configuration, block marker syntax)
//! - Render recoverable failures as well-formed HTTP error pages
//!
//! # Design Decisions
//! - Recoverable conditions become error-page responses at the boundary
//! - Configuration and syntax errors propagate to the caller
//! - Transport failures never surface here; they are mapped to synthesized
//!   responses inside the outbound client

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

/// Errors raised while routing, rewriting, or rendering a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Registry never populated, unknown driver name, or malformed settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No URI mapping matched the request.
    #[error("no mapping defined for url {url}")]
    NoMappingFound { url: String },

    /// Inbound method outside both the simple and entity method sets.
    #[error("unsupported method {method} {uri}")]
    UnsupportedMethod { method: String, uri: String },

    /// Malformed block marker payload; fatal to the current page render.
    #[error("invalid block marker syntax: {0}")]
    AggregationSyntax(String),

    /// A URI-bearing value could not be translated between namespaces.
    #[error("cannot translate uri: {0}")]
    UriTranslation(String),

    /// A fragment fetch did not produce a usable page.
    #[error("fragment fetch {url} returned status {status}")]
    FragmentUnavailable { url: String, status: u16 },

    /// A response body could not be read back.
    #[error("error retrieving url: {0}")]
    Retrieval(String),
}

impl GatewayError {
    /// HTTP status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::NoMappingFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::UnsupportedMethod { .. } => StatusCode::BAD_REQUEST,
            GatewayError::AggregationSyntax(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UriTranslation(_) => StatusCode::BAD_REQUEST,
            GatewayError::FragmentUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short reason phrase for the status line and error page title.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Configuration(_) => "Configuration error",
            GatewayError::NoMappingFound { .. } => "Not found",
            GatewayError::UnsupportedMethod { .. } => "Unsupported method",
            GatewayError::AggregationSyntax(_) => "Aggregation syntax error",
            GatewayError::UriTranslation(_) => "Bad request",
            GatewayError::FragmentUnavailable { .. } => "Fragment unavailable",
            GatewayError::Retrieval(_) => "Error retrieving URL",
        }
    }

    /// Build a minimal HTML error page carrying this error.
    pub fn into_error_page(self) -> Response<Body> {
        let status = self.status();
        let body = format!(
            "<html><head><title>{} {}</title></head><body><h1>{}</h1><p>{}</p></body></html>",
            status.as_u16(),
            self.reason(),
            self.reason(),
            self
        );
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.into_error_page().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_miss_is_404() {
        let err = GatewayError::NoMappingFound {
            url: "http://localhost/nowhere".into(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.reason(), "Not found");
    }

    #[test]
    fn test_unsupported_method_is_client_error() {
        let err = GatewayError::UnsupportedMethod {
            method: "BREW".into(),
            uri: "http://localhost/pot".into(),
        };
        assert!(err.status().is_client_error());
    }

    #[test]
    fn test_error_page_carries_status() {
        let err = GatewayError::UriTranslation("not a uri".into());
        let page = err.into_error_page();
        assert_eq!(page.status(), StatusCode::BAD_REQUEST);
    }
}
