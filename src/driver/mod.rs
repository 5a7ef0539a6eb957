//! Backend drivers.
//!
//! # Data Flow
//! ```text
//! merged driver properties
//!     → DriverConfig (typed settings, filter lists, mappings)
//!     → Driver (config + base-URL strategy + pooled client)
//!
//! Per request:
//!     inbound request + matched mapping
//!     → pick base URL (strategy)
//!     → build outbound request (http::request)
//!     → execute (http::client, cache, failure mapping)
//!     → rewritten response
//! ```
//!
//! # Design Decisions
//! - A driver is immutable after construction; reconfiguration replaces
//!   it in the registry snapshot, never mutates it
//! - Each driver owns one pooled client and one optional cache
//! - Fragment fetches share the same rewrite pipeline in GET mode

use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use url::Url;

use crate::config::{params, PropertySet};
use crate::error::GatewayError;
use crate::http::client::OutboundClient;
use crate::http::filter::FilterList;
use crate::http::request::{build_outbound, InboundRequest};
use crate::registry::mapping::UriMapping;
use crate::tags::BlockRenderer;
use crate::url::BaseUrlRetrieveStrategy;

/// Outbound HTTP proxy between the gateway and its backends.
#[derive(Debug, Clone)]
pub struct OutboundProxy {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl OutboundProxy {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Basic` Proxy-Authorization value, when credentials are set.
    pub fn basic_credentials(&self) -> Option<String> {
        let user = self.user.as_deref()?;
        let password = self.password.as_deref().unwrap_or("");
        Some(format!(
            "Basic {}",
            BASE64.encode(format!("{user}:{password}"))
        ))
    }
}

/// Typed per-driver settings, parsed once from the merged property set.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub base_urls: Vec<Url>,
    pub strategy_name: Option<String>,
    pub mappings: Vec<UriMapping>,
    pub use_cache: bool,
    pub preserve_host: bool,
    pub aggregate: bool,
    pub request_headers: FilterList,
    pub response_headers: FilterList,
    pub proxy: Option<OutboundProxy>,
    pub max_connections_per_host: usize,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
}

impl DriverConfig {
    pub fn from_properties(properties: &PropertySet) -> Result<Self, GatewayError> {
        let base_urls = properties
            .get_list(params::REMOTE_URL_BASE)
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    GatewayError::Configuration(format!("invalid remote_url_base {raw}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if base_urls.is_empty() {
            return Err(GatewayError::Configuration(
                "remote_url_base is required".into(),
            ));
        }

        let mappings = properties
            .get_list(params::MAPPINGS)
            .iter()
            .map(|pattern| UriMapping::compile(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let mut request_headers = FilterList::allow_all();
        request_headers.set_discarded(params::DEFAULT_DISCARD_REQUEST_HEADERS.split(','));
        request_headers.set_forwarded(properties.get_list(params::FORWARD_REQUEST_HEADERS));
        request_headers.set_discarded(properties.get_list(params::DISCARD_REQUEST_HEADERS));

        let mut response_headers = FilterList::allow_all();
        response_headers.set_discarded(params::DEFAULT_DISCARD_RESPONSE_HEADERS.split(','));
        response_headers.set_forwarded(properties.get_list(params::FORWARD_RESPONSE_HEADERS));
        response_headers.set_discarded(properties.get_list(params::DISCARD_RESPONSE_HEADERS));

        let proxy = match properties.get(params::PROXY_HOST) {
            Some(host) => Some(OutboundProxy {
                host: host.to_owned(),
                port: properties.get_u64(params::PROXY_PORT, 3128)? as u16,
                user: properties.get(params::PROXY_USER).map(str::to_owned),
                password: properties.get(params::PROXY_PASSWORD).map(str::to_owned),
            }),
            None => None,
        };

        Ok(Self {
            base_urls,
            strategy_name: properties
                .get(params::REMOTE_URL_BASE_STRATEGY)
                .map(str::to_owned),
            mappings,
            use_cache: properties.get_bool(params::USE_CACHE, false)?,
            preserve_host: properties.get_bool(params::PRESERVE_HOST, false)?,
            aggregate: properties.get_bool(params::AGGREGATE, false)?,
            request_headers,
            response_headers,
            proxy,
            max_connections_per_host: properties.get_usize(
                params::MAX_CONNECTIONS_PER_HOST,
                params::DEFAULT_MAX_CONNECTIONS_PER_HOST,
            )?,
            connect_timeout: Duration::from_millis(
                properties.get_u64(params::CONNECT_TIMEOUT, params::DEFAULT_CONNECT_TIMEOUT_MS)?,
            ),
            socket_timeout: Duration::from_millis(
                properties.get_u64(params::SOCKET_TIMEOUT, params::DEFAULT_SOCKET_TIMEOUT_MS)?,
            ),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            base_urls: vec![Url::parse("http://backend:8080/").unwrap()],
            strategy_name: None,
            mappings: Vec::new(),
            use_cache: false,
            preserve_host: false,
            aggregate: false,
            request_headers: FilterList::allow_all(),
            response_headers: FilterList::allow_all(),
            proxy: None,
            max_connections_per_host: params::DEFAULT_MAX_CONNECTIONS_PER_HOST,
            connect_timeout: Duration::from_millis(params::DEFAULT_CONNECT_TIMEOUT_MS),
            socket_timeout: Duration::from_millis(params::DEFAULT_SOCKET_TIMEOUT_MS),
        }
    }
}

/// One configured backend target.
#[derive(Debug)]
pub struct Driver {
    name: String,
    config: DriverConfig,
    strategy: Box<dyn BaseUrlRetrieveStrategy>,
    client: OutboundClient,
}

impl Driver {
    pub fn new(name: &str, properties: &PropertySet) -> Result<Self, GatewayError> {
        let config = DriverConfig::from_properties(properties).map_err(|e| {
            GatewayError::Configuration(format!("driver {name}: {e}"))
        })?;
        let strategy =
            crate::url::from_config(config.base_urls.clone(), config.strategy_name.as_deref())?;
        let client = OutboundClient::new(&config)?;

        tracing::info!(
            driver = name,
            base_urls = config.base_urls.len(),
            mappings = config.mappings.len(),
            use_cache = config.use_cache,
            "Driver configured"
        );

        Ok(Self {
            name: name.to_owned(),
            config,
            strategy,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn mappings(&self) -> &[UriMapping] {
        &self.config.mappings
    }

    /// Forward an inbound request transparently and rewrite the response.
    pub async fn proxy(
        &self,
        inbound: &InboundRequest,
        mapping: &UriMapping,
    ) -> Result<Response<Body>, GatewayError> {
        let base = self.strategy.base_url(inbound.remote_addr).clone();
        let relative = relative_path(inbound, mapping.path_prefix());
        let target = join_target(&base, &relative)?;
        let proxy_base = self.proxy_base(inbound, mapping.path_prefix())?;

        tracing::debug!(
            driver = %self.name,
            target = %target,
            "Forwarding request"
        );

        let outbound = build_outbound(inbound, &target, &base, &proxy_base, true, &self.config)?;
        Ok(self
            .client
            .execute(outbound, &self.config, &base, &proxy_base)
            .await)
    }

    /// Fetch `page` in fragment mode and extract the named block.
    ///
    /// An empty block name yields the whole page body.
    pub async fn render_block(
        &self,
        page: &str,
        block: &str,
        inbound: &InboundRequest,
    ) -> Result<String, GatewayError> {
        let base = self.strategy.base_url(inbound.remote_addr).clone();
        let relative = if page.starts_with('/') {
            page.to_owned()
        } else {
            format!("/{page}")
        };
        let target = join_target(&base, &relative)?;
        let proxy_base = self.proxy_base(inbound, "")?;

        let outbound = build_outbound(inbound, &target, &base, &proxy_base, false, &self.config)?;
        let response = self
            .client
            .execute(outbound, &self.config, &base, &proxy_base)
            .await;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::FragmentUnavailable {
                url: target.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| GatewayError::Retrieval(e.to_string()))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        if block.is_empty() {
            Ok(body)
        } else {
            BlockRenderer::render(block, &body)
        }
    }

    /// The visible base of this driver: inbound origin plus mapping prefix.
    fn proxy_base(&self, inbound: &InboundRequest, prefix: &str) -> Result<Url, GatewayError> {
        let base = format!("{}://{}{}", inbound.scheme(), inbound.host(), prefix);
        Url::parse(&base).map_err(|e| GatewayError::UriTranslation(format!("{base}: {e}")))
    }
}

/// Inbound path and query with the mapping prefix stripped.
fn relative_path(inbound: &InboundRequest, prefix: &str) -> String {
    let path_and_query = inbound
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let stripped = if prefix.is_empty() {
        path_and_query
    } else {
        path_and_query.strip_prefix(prefix).unwrap_or(path_and_query)
    };
    if stripped.starts_with('/') {
        stripped.to_owned()
    } else {
        format!("/{stripped}")
    }
}

/// Append a gateway-relative path to a base URL.
fn join_target(base: &Url, relative: &str) -> Result<Url, GatewayError> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), relative);
    Url::parse(&joined).map_err(|e| GatewayError::UriTranslation(format!("{joined}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_properties() -> PropertySet {
        let mut props = PropertySet::new();
        props.put("remote_url_base", "http://backend:8080/app/");
        props.put("mappings", "/shop");
        props.put("use_cache", "true");
        props.put("connect_timeout", "700");
        props
    }

    #[test]
    fn test_config_parses_typed_settings() {
        let config = DriverConfig::from_properties(&driver_properties()).unwrap();
        assert_eq!(config.base_urls[0].as_str(), "http://backend:8080/app/");
        assert_eq!(config.mappings.len(), 1);
        assert!(config.use_cache);
        assert_eq!(config.connect_timeout, Duration::from_millis(700));
        assert_eq!(config.socket_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_missing_base_url_is_configuration_error() {
        let props = PropertySet::new();
        assert!(DriverConfig::from_properties(&props).is_err());
    }

    #[test]
    fn test_default_filters_drop_hop_by_hop() {
        let config = DriverConfig::from_properties(&driver_properties()).unwrap();
        assert!(!config.request_headers.contains("Connection"));
        assert!(!config.request_headers.contains("Transfer-Encoding"));
        assert!(config.request_headers.contains("Accept-Language"));
        assert!(config.request_headers.contains("Cookie"));
        assert!(config.response_headers.contains("Set-Cookie"));
    }

    #[test]
    fn test_proxy_credentials_are_basic_encoded() {
        let proxy = OutboundProxy {
            host: "proxy".into(),
            port: 3128,
            user: Some("user".into()),
            password: Some("secret".into()),
        };
        assert_eq!(
            proxy.basic_credentials().unwrap(),
            format!("Basic {}", BASE64.encode("user:secret"))
        );
        assert_eq!(proxy.authority(), "proxy:3128");
    }

    #[test]
    fn test_driver_builds_from_properties() {
        let driver = Driver::new("shop", &driver_properties()).unwrap();
        assert_eq!(driver.name(), "shop");
        assert_eq!(driver.mappings().len(), 1);
    }

    #[test]
    fn test_relative_path_strips_mapping_prefix() {
        let inbound = InboundRequest {
            method: axum::http::Method::GET,
            uri: "http://www.example.com/shop/cart?item=1".parse().unwrap(),
            headers: Default::default(),
            remote_addr: None,
            body: Default::default(),
        };
        assert_eq!(relative_path(&inbound, "/shop"), "/cart?item=1");
        assert_eq!(relative_path(&inbound, ""), "/shop/cart?item=1");
    }

    #[test]
    fn test_join_target_keeps_base_path() {
        let base = Url::parse("http://backend:8080/app/").unwrap();
        let target = join_target(&base, "/cart?item=1").unwrap();
        assert_eq!(target.as_str(), "http://backend:8080/app/cart?item=1");
    }
}
