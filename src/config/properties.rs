//! Flat property model for driver configuration.
//!
//! # Responsibilities
//! - Hold `key = value` settings in declaration order
//! - Group `prefix.key` settings into per-driver property sets
//! - Merge per-driver settings over prefix-less defaults
//! - Provide typed accessors with per-setting defaults
//!
//! # Design Decisions
//! - Declaration order is preserved; mapping order derives from it
//! - Lookups are last-wins so override files can shadow base settings
//! - Values are strings; typing happens at the accessor, not at load time

use crate::error::GatewayError;

/// Setting names and built-in defaults recognized by drivers.
pub mod params {
    pub const REMOTE_URL_BASE: &str = "remote_url_base";
    pub const REMOTE_URL_BASE_STRATEGY: &str = "remote_url_base_strategy";
    pub const MAPPINGS: &str = "mappings";
    pub const USE_CACHE: &str = "use_cache";
    pub const PRESERVE_HOST: &str = "preserve_host";
    pub const AGGREGATE: &str = "aggregate";
    pub const FORWARD_REQUEST_HEADERS: &str = "forward_request_headers";
    pub const DISCARD_REQUEST_HEADERS: &str = "discard_request_headers";
    pub const FORWARD_RESPONSE_HEADERS: &str = "forward_response_headers";
    pub const DISCARD_RESPONSE_HEADERS: &str = "discard_response_headers";
    pub const PROXY_HOST: &str = "proxy_host";
    pub const PROXY_PORT: &str = "proxy_port";
    pub const PROXY_USER: &str = "proxy_user";
    pub const PROXY_PASSWORD: &str = "proxy_password";
    pub const MAX_CONNECTIONS_PER_HOST: &str = "max_connections_per_host";
    pub const CONNECT_TIMEOUT: &str = "connect_timeout";
    pub const SOCKET_TIMEOUT: &str = "socket_timeout";

    pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 20;
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
    pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 10_000;

    /// Hop-by-hop headers discarded from outbound requests by default.
    pub const DEFAULT_DISCARD_REQUEST_HEADERS: &str =
        "Connection,Content-Length,Host,Keep-Alive,Max-Forwards,Proxy-Authorization,TE,Trailer,Transfer-Encoding,Upgrade";

    /// Hop-by-hop headers discarded from rewritten responses by default.
    pub const DEFAULT_DISCARD_RESPONSE_HEADERS: &str =
        "Connection,Content-Length,Keep-Alive,Proxy-Authenticate,Proxy-Authorization,TE,Trailer,Transfer-Encoding,Upgrade";
}

/// Ordered set of flat `key = value` settings.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    entries: Vec<(String, String)>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a setting. Later entries shadow earlier ones on lookup.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Append every entry of `other`, shadowing same-named settings.
    pub fn merge(&mut self, other: &PropertySet) {
        for (key, value) in &other.entries {
            self.put(key.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Last value declared for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool, GatewayError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| {
                GatewayError::Configuration(format!("setting {name} is not a boolean: {raw}"))
            }),
        }
    }

    pub fn get_u64(&self, name: &str, default: u64) -> Result<u64, GatewayError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                GatewayError::Configuration(format!("setting {name} is not an integer: {raw}"))
            }),
        }
    }

    pub fn get_usize(&self, name: &str, default: usize) -> Result<usize, GatewayError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                GatewayError::Configuration(format!("setting {name} is not an integer: {raw}"))
            }),
        }
    }

    /// Comma-separated list value, trimmed, empty items dropped.
    pub fn get_list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Split into prefix-less defaults and per-prefix driver sets.
    ///
    /// `prefix.key` goes into the set for `prefix` (split at the last dot);
    /// bare keys are defaults. Driver order follows the first appearance of
    /// each prefix, which makes mapping order a configuration contract.
    pub fn group_by_prefix(&self) -> (PropertySet, Vec<(String, PropertySet)>) {
        let mut defaults = PropertySet::new();
        let mut drivers: Vec<(String, PropertySet)> = Vec::new();

        for (key, value) in self.iter() {
            match key.rsplit_once('.') {
                None => defaults.put(key, value),
                Some((prefix, name)) => {
                    match drivers.iter_mut().find(|(existing, _)| existing == prefix) {
                        Some((_, set)) => set.put(name, value),
                        None => {
                            let mut set = PropertySet::new();
                            set.put(name, value);
                            drivers.push((prefix.to_owned(), set));
                        }
                    }
                }
            }
        }

        (defaults, drivers)
    }
}
