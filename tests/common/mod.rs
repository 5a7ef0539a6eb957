//! Shared utilities for integration testing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read the request head so the client sees its request accepted.
async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        status_line,
        body.len(),
        extra_headers,
        body
    )
}

/// Start a mock backend that returns a fixed body for every request.
pub async fn start_mock_backend(addr: SocketAddr, body: &'static str) {
    start_mock_backend_with(addr, "200 OK", "Content-Type: text/html\r\n", body).await;
}

/// Start a mock backend with a fixed status line, headers and body.
pub async fn start_mock_backend_with(
    addr: SocketAddr,
    status_line: &'static str,
    extra_headers: &'static str,
    body: &'static str,
) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_request_head(&mut socket).await;
                        let response = http_response(status_line, extra_headers, body);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a backend that routes by request path.
///
/// Each route is (path, status line, extra headers, body). Unknown paths
/// get a 404.
pub async fn start_routing_backend(
    addr: SocketAddr,
    routes: Vec<(&'static str, &'static str, &'static str, &'static str)>,
) {
    let listener = TcpListener::bind(addr).await.unwrap();
    let routes: Arc<HashMap<&'static str, (&'static str, &'static str, &'static str)>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, status, headers, body)| (path, (status, headers, body)))
            .collect(),
    );

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let routes = routes.clone();
                    tokio::spawn(async move {
                        let head = read_request_head(&mut socket).await;
                        let path = head
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or("/")
                            .split('?')
                            .next()
                            .unwrap_or("/");
                        let response = match routes.get(path) {
                            Some((status, headers, body)) => {
                                http_response(status, headers, body)
                            }
                            None => http_response("404 Not Found", "", "not found"),
                        };
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a backend that counts requests before answering.
pub async fn start_counting_backend(
    addr: SocketAddr,
    extra_headers: &'static str,
    body: &'static str,
) -> Arc<AtomicU32> {
    let listener = TcpListener::bind(addr).await.unwrap();
    let counter = Arc::new(AtomicU32::new(0));
    let shared = counter.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        let _ = read_request_head(&mut socket).await;
                        shared.fetch_add(1, Ordering::SeqCst);
                        let response = http_response("200 OK", extra_headers, body);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    counter
}

/// Start a backend that accepts connections but never responds.
pub async fn start_silent_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        drop(socket);
                    });
                }
                Err(_) => break,
            }
        }
    });
}
