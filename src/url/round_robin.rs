//! Round-robin base-URL rotation.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use crate::url::BaseUrlRetrieveStrategy;

/// Rotates through the configured base URLs with an atomic counter.
#[derive(Debug)]
pub struct RoundRobin {
    urls: Vec<Url>,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(urls: Vec<Url>) -> Self {
        Self {
            urls,
            counter: AtomicUsize::new(0),
        }
    }
}

impl BaseUrlRetrieveStrategy for RoundRobin {
    fn base_url(&self, _remote_addr: Option<IpAddr>) -> &Url {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }
}
