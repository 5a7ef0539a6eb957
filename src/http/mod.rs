//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (axum setup, registry lookup)
//!     → request.rs (outbound construction, header policy)
//!     → client.rs (pooled execution, cache, failure mapping)
//!     → response.rs (header rewrite back into the proxy namespace)
//!     → send to client
//! ```

pub mod cache;
pub mod client;
pub mod filter;
pub mod request;
pub mod response;
pub mod server;
pub mod uri;

pub use client::failure_reason;
pub use filter::FilterList;
pub use request::InboundRequest;
pub use server::GatewayServer;
