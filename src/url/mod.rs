//! Base-URL retrieve strategies.
//!
//! A driver may declare several base URLs for the same logical backend.
//! A strategy picks one per request.
//!
//! # Design Decisions
//! - Strategy chosen at driver construction, immutable afterwards
//! - Selection input is the client address only; strategies must cope
//!   with an absent or unparseable address
//! - One URL short-circuits to the single strategy regardless of setting

use std::net::IpAddr;

use url::Url;

use crate::error::GatewayError;

pub mod ip_hash;
pub mod round_robin;

pub use ip_hash::IpHash;
pub use round_robin::RoundRobin;

/// Picks one of the configured base URLs for a request.
pub trait BaseUrlRetrieveStrategy: Send + Sync + std::fmt::Debug {
    fn base_url(&self, remote_addr: Option<IpAddr>) -> &Url;
}

/// Trivial strategy for a single configured URL.
#[derive(Debug)]
pub struct SingleBaseUrl {
    url: Url,
}

impl SingleBaseUrl {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl BaseUrlRetrieveStrategy for SingleBaseUrl {
    fn base_url(&self, _remote_addr: Option<IpAddr>) -> &Url {
        &self.url
    }
}

/// Build the strategy named by configuration over the given URL list.
pub fn from_config(
    mut urls: Vec<Url>,
    strategy: Option<&str>,
) -> Result<Box<dyn BaseUrlRetrieveStrategy>, GatewayError> {
    match urls.len() {
        0 => Err(GatewayError::Configuration(
            "remote_url_base must list at least one URL".into(),
        )),
        1 => Ok(Box::new(SingleBaseUrl::new(urls.remove(0)))),
        _ => match strategy.unwrap_or("roundrobin") {
            "roundrobin" => Ok(Box::new(RoundRobin::new(urls))),
            "iphash" => Ok(Box::new(IpHash::new(urls))),
            other => Err(GatewayError::Configuration(format!(
                "unknown remote_url_base_strategy: {other}"
            ))),
        },
    }
}
