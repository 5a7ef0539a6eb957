//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the axum router with the gateway handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Route each request through the driver registry
//! - Run the aggregation pass over HTML responses when configured
//!
//! # Design Decisions
//! - The registry is the only shared state; everything else is derived
//!   per request
//! - Recoverable errors become error pages here, at the boundary
//! - Aggregation resolves include directives after the scan, keeping the
//!   parser synchronous

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Request, Response};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::PropertySet;
use crate::error::GatewayError;
use crate::http::request::InboundRequest;
use crate::observability::metrics;
use crate::registry::DriverRegistry;
use crate::tags::AggregateRenderer;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Largest inbound body the gateway buffers for forwarding.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<DriverRegistry>,
}

/// Request-id generation for the SetRequestId layer.
#[derive(Clone, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    bind_address: String,
}

impl GatewayServer {
    /// Create a new server over a configured registry.
    pub fn new(
        registry: Arc<DriverRegistry>,
        properties: &PropertySet,
    ) -> Result<Self, GatewayError> {
        let bind_address = properties
            .get("bind_address")
            .unwrap_or(DEFAULT_BIND_ADDRESS)
            .to_owned();
        let request_timeout =
            properties.get_u64("request_timeout", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        let state = AppState { registry };
        let router = Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(request_timeout))),
            );

        Ok(Self {
            router,
            bind_address,
        })
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main gateway handler: route, forward, rewrite, aggregate.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> axum::response::Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return GatewayError::Retrieval(e.to_string()).into_response();
        }
    };

    let inbound = match InboundRequest::from_parts(&parts, Some(addr.ip()), body) {
        Ok(inbound) => inbound,
        Err(e) => return e.into_response(),
    };

    let path = inbound.path().to_owned();
    let lookup = state
        .registry
        .instance_for(inbound.scheme(), inbound.host(), &path);
    let (driver, mapping) = match lookup {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(host = %inbound.host(), path = %path, "No mapping matched");
            metrics::record_request(&method, e.status().as_u16(), "none", start_time);
            return e.into_response();
        }
    };

    let response = match driver.proxy(&inbound, &mapping).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(driver = %driver.name(), error = %e, "Request rewrite failed");
            metrics::record_request(&method, e.status().as_u16(), driver.name(), start_time);
            return e.into_response();
        }
    };

    let response = if driver.config().aggregate && is_html(&response) {
        match aggregate_response(&state.registry, &inbound, response).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(driver = %driver.name(), error = %e, "Aggregation failed");
                metrics::record_request(&method, e.status().as_u16(), driver.name(), start_time);
                return e.into_response();
            }
        }
    } else {
        response
    };

    metrics::record_request(&method, response.status().as_u16(), driver.name(), start_time);
    response.into_response()
}

fn is_html<B>(response: &Response<B>) -> bool {
    response.status().is_success()
        && response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/html"))
            .unwrap_or(false)
}

/// Replace include markers in an HTML response with fetched fragments.
async fn aggregate_response(
    registry: &DriverRegistry,
    inbound: &InboundRequest,
    response: Response<Body>,
) -> Result<Response<Body>, GatewayError> {
    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::Retrieval(e.to_string()))?;
    let page = String::from_utf8_lossy(&bytes);

    let composed = aggregate_page(registry, inbound, &page).await?;

    // The body changed size; the transport recomputes the length.
    parts.headers.remove(header::CONTENT_LENGTH);
    Ok(Response::from_parts(parts, Body::from(composed)))
}

/// Scan a page for include directives and splice in each fragment.
pub async fn aggregate_page(
    registry: &DriverRegistry,
    inbound: &InboundRequest,
    page: &str,
) -> Result<String, GatewayError> {
    let (mut out, directives) = AggregateRenderer::scan(page)?;
    for directive in directives.iter().rev() {
        let driver = registry.instance(&directive.driver)?;
        let fragment = driver
            .render_block(&directive.page, &directive.block, inbound)
            .await?;
        out.insert_str(directive.at, &fragment);
    }
    Ok(out)
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
    }
    tracing::info!("Shutdown signal received");
}
