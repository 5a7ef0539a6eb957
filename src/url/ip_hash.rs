//! Client-IP-hash base-URL selection.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use url::Url;

use crate::url::BaseUrlRetrieveStrategy;

/// Maps each client address to a stable base URL.
///
/// An absent address hashes like any other key, so selection stays total.
#[derive(Debug)]
pub struct IpHash {
    urls: Vec<Url>,
}

impl IpHash {
    pub fn new(urls: Vec<Url>) -> Self {
        Self { urls }
    }
}

impl BaseUrlRetrieveStrategy for IpHash {
    fn base_url(&self, remote_addr: Option<IpAddr>) -> &Url {
        let mut hasher = DefaultHasher::new();
        remote_addr.hash(&mut hasher);
        let index = (hasher.finish() % self.urls.len() as u64) as usize;
        &self.urls[index]
    }
}
