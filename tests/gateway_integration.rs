//! End-to-end tests for the gateway against raw-TCP mock backends.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;

use fragment_gateway::config::PropertySet;
use fragment_gateway::http::server::aggregate_page;
use fragment_gateway::http::{failure_reason, InboundRequest};
use fragment_gateway::registry::DriverRegistry;

mod common;

fn properties(entries: &[(&str, &str)]) -> PropertySet {
    let mut props = PropertySet::new();
    for (key, value) in entries {
        props.put(*key, *value);
    }
    props
}

fn inbound(path: &str) -> InboundRequest {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static("test-agent"));
    InboundRequest {
        method: Method::GET,
        uri: format!("http://www.example.com{path}").parse().unwrap(),
        headers,
        remote_addr: Some([127, 0, 0, 1].into()),
        body: Bytes::new(),
    }
}

async fn body_string(response: axum::http::Response<axum::body::Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn test_proxy_forwards_to_matched_backend() {
    let backend_addr: SocketAddr = "127.0.0.1:28281".parse().unwrap();
    common::start_mock_backend(backend_addr, "<html>backend page</html>").await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[
            ("shop.remote_url_base", "http://127.0.0.1:28281/"),
            ("shop.mappings", "/shop"),
        ]))
        .unwrap();

    let (driver, mapping) = registry
        .instance_for("http", "www.example.com", "/shop/page")
        .unwrap();
    assert_eq!(driver.name(), "shop");

    let response = driver.proxy(&inbound("/shop/page"), &mapping).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "<html>backend page</html>");
}

#[tokio::test]
async fn test_connection_refused_maps_to_502() {
    // Nothing listens on this port.
    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[
            ("dead.remote_url_base", "http://127.0.0.1:28299/"),
            ("dead.mappings", "/dead"),
        ]))
        .unwrap();

    let (driver, mapping) = registry
        .instance_for("http", "www.example.com", "/dead/page")
        .unwrap();
    let response = driver.proxy(&inbound("/dead/page"), &mapping).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(failure_reason(&response), Some("Connection refused"));
    assert_eq!(body_string(response).await, "Connection refused");
}

#[tokio::test]
async fn test_socket_timeout_maps_to_504() {
    let backend_addr: SocketAddr = "127.0.0.1:28282".parse().unwrap();
    common::start_silent_backend(backend_addr).await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[
            ("slow.remote_url_base", "http://127.0.0.1:28282/"),
            ("slow.mappings", "/slow"),
            ("slow.socket_timeout", "300"),
        ]))
        .unwrap();

    let (driver, mapping) = registry
        .instance_for("http", "www.example.com", "/slow/page")
        .unwrap();
    let response = driver.proxy(&inbound("/slow/page"), &mapping).await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(failure_reason(&response), Some("Socket timeout"));
}

#[tokio::test]
async fn test_render_block_extracts_fragment() {
    let backend_addr: SocketAddr = "127.0.0.1:28283".parse().unwrap();
    common::start_mock_backend(
        backend_addr,
        "<html><!--$beginblock$$news$--><p>breaking</p><!--$endblock$$news$--></html>",
    )
    .await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[(
            "news.remote_url_base",
            "http://127.0.0.1:28283/",
        )]))
        .unwrap();

    let driver = registry.instance("news").unwrap();
    let fragment = driver
        .render_block("/page.html", "news", &inbound("/"))
        .await
        .unwrap();
    assert_eq!(fragment, "<p>breaking</p>");
}

#[tokio::test]
async fn test_aggregation_splices_fragment_into_master_page() {
    let fragments_addr: SocketAddr = "127.0.0.1:28284".parse().unwrap();
    common::start_mock_backend(
        fragments_addr,
        "<!--$beginblock$$cart$-->3 items<!--$endblock$$cart$-->",
    )
    .await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[
            ("master.remote_url_base", "http://127.0.0.1:28290/"),
            ("master.aggregate", "true"),
            ("fragments.remote_url_base", "http://127.0.0.1:28284/"),
        ]))
        .unwrap();

    let page = "<header><!--$includeblock$fragments$/cart.html$cart$--></header>";
    let composed = aggregate_page(&registry, &inbound("/"), page)
        .await
        .unwrap();
    assert_eq!(composed, "<header>3 items</header>");
}

#[tokio::test]
async fn test_cache_serves_repeat_fetch_without_dialing() {
    let backend_addr: SocketAddr = "127.0.0.1:28285".parse().unwrap();
    let counter = common::start_counting_backend(
        backend_addr,
        "Cache-Control: max-age=60\r\nContent-Type: text/html\r\n",
        "cached page",
    )
    .await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[
            ("cached.remote_url_base", "http://127.0.0.1:28285/"),
            ("cached.mappings", "/cached"),
            ("cached.use_cache", "true"),
        ]))
        .unwrap();

    let (driver, mapping) = registry
        .instance_for("http", "www.example.com", "/cached/page")
        .unwrap();

    let first = driver.proxy(&inbound("/cached/page"), &mapping).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_string(first).await, "cached page");

    let second = driver.proxy(&inbound("/cached/page"), &mapping).await.unwrap();
    assert_eq!(body_string(second).await, "cached page");

    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fragment_fetch_follows_redirect() {
    let backend_addr: SocketAddr = "127.0.0.1:28286".parse().unwrap();
    common::start_routing_backend(
        backend_addr,
        vec![
            (
                "/old.html",
                "302 Found",
                "Location: /new.html\r\n",
                "",
            ),
            (
                "/new.html",
                "200 OK",
                "Content-Type: text/html\r\n",
                "<!--$beginblock$$b$-->moved content<!--$endblock$$b$-->",
            ),
        ],
    )
    .await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[(
            "site.remote_url_base",
            "http://127.0.0.1:28286/",
        )]))
        .unwrap();

    let driver = registry.instance("site").unwrap();
    let fragment = driver
        .render_block("/old.html", "b", &inbound("/"))
        .await
        .unwrap();
    assert_eq!(fragment, "moved content");
}

#[tokio::test]
async fn test_proxy_mode_returns_redirect_untouched_and_translated() {
    let backend_addr: SocketAddr = "127.0.0.1:28287".parse().unwrap();
    common::start_mock_backend_with(
        backend_addr,
        "302 Found",
        "Location: http://127.0.0.1:28287/login;jsessionid=ABC\r\n",
        "",
    )
    .await;

    let registry = DriverRegistry::new();
    registry
        .configure(&properties(&[
            ("auth.remote_url_base", "http://127.0.0.1:28287/"),
            ("auth.mappings", "/auth"),
        ]))
        .unwrap();

    let (driver, mapping) = registry
        .instance_for("http", "www.example.com", "/auth/page")
        .unwrap();
    let response = driver.proxy(&inbound("/auth/page"), &mapping).await.unwrap();

    // Proxy mode: the redirect reaches the client, rewritten into the
    // proxy namespace with the session id stripped.
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "http://www.example.com/auth/login"
    );
}
