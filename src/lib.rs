//! Reverse-proxy / page-aggregation gateway library.

pub mod config;
pub mod driver;
pub mod error;
pub mod http;
pub mod observability;
pub mod registry;
pub mod tags;
pub mod url;

pub use config::PropertySet;
pub use driver::Driver;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use registry::DriverRegistry;
