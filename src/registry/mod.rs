//! Driver registry and URI routing.
//!
//! # Data Flow
//! ```text
//! flat properties
//!     → group by prefix, merge over defaults
//!     → one Driver per prefix (+ synthesized "default")
//!     → RegistrySnapshot (name → driver, ordered mapping → name)
//!     → atomic swap into the registry
//!
//! Per request:
//!     (scheme, host, path)
//!     → first matching mapping in declaration order
//!     → (driver, mapping)
//! ```
//!
//! # Design Decisions
//! - Readers never lock: the active snapshot is one atomic reference
//! - Writers serialize on a mutex around copy-modify-swap only
//! - First match wins; declaration order is the tie-breaker, never
//!   specificity
//! - No implicit fallback to "default" during URI routing

pub mod mapping;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::config::{params, PropertySet};
use crate::driver::Driver;
use crate::error::GatewayError;
use crate::registry::mapping::UriMapping;

const DEFAULT_INSTANCE_NAME: &str = "default";

/// Immutable registry state, replaced wholesale on reconfiguration.
///
/// Invariant: every mapping target names a key of `instances`, and the
/// mapping list keeps configuration declaration order.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    instances: HashMap<String, Arc<Driver>>,
    mappings: Vec<(UriMapping, String)>,
}

impl RegistrySnapshot {
    fn from_drivers(drivers: Vec<Arc<Driver>>) -> Self {
        let mut instances = HashMap::new();
        let mut mappings = Vec::new();
        for driver in drivers {
            for mapping in driver.mappings() {
                mappings.push((mapping.clone(), driver.name().to_owned()));
            }
            instances.insert(driver.name().to_owned(), driver);
        }
        Self {
            instances,
            mappings,
        }
    }

    /// Copy with one driver inserted or replaced.
    ///
    /// Mappings of other drivers keep their position; the new driver's
    /// mappings are appended, replacing any it previously declared.
    fn with_driver(&self, driver: Arc<Driver>) -> Self {
        let name = driver.name().to_owned();
        let mut instances = self.instances.clone();
        let mut mappings: Vec<(UriMapping, String)> = self
            .mappings
            .iter()
            .filter(|(_, target)| *target != name)
            .cloned()
            .collect();
        for mapping in driver.mappings() {
            mappings.push((mapping.clone(), name.clone()));
        }
        instances.insert(name, driver);
        Self {
            instances,
            mappings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Process-wide driver configuration with lock-free readers.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    current: ArcSwap<RegistrySnapshot>,
    write_lock: Mutex<()>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build all drivers from a flat property set and install them.
    ///
    /// `prefix.key` settings merge over bare defaults per driver. A
    /// driver named `default` is synthesized from the bare defaults when
    /// no `default.` prefix was declared but a default base URL exists.
    pub fn configure(&self, properties: &PropertySet) -> Result<(), GatewayError> {
        let snapshot = Self::build_snapshot(properties)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.current.store(Arc::new(snapshot));
        tracing::info!("Driver registry configured");
        Ok(())
    }

    fn build_snapshot(properties: &PropertySet) -> Result<RegistrySnapshot, GatewayError> {
        let (defaults, driver_properties) = properties.group_by_prefix();

        let mut drivers = Vec::new();
        let mut default_declared = false;
        for (name, overrides) in &driver_properties {
            let mut merged = defaults.clone();
            merged.merge(overrides);
            default_declared |= name.as_str() == DEFAULT_INSTANCE_NAME;
            drivers.push(Arc::new(Driver::new(name, &merged)?));
        }

        if !default_declared && defaults.get(params::REMOTE_URL_BASE).is_some() {
            drivers.push(Arc::new(Driver::new(DEFAULT_INSTANCE_NAME, &defaults)?));
        }

        Ok(RegistrySnapshot::from_drivers(drivers))
    }

    /// Register or replace exactly one driver from its own properties.
    pub fn configure_one(
        &self,
        name: &str,
        properties: &PropertySet,
    ) -> Result<(), GatewayError> {
        self.put(Arc::new(Driver::new(name, properties)?));
        Ok(())
    }

    /// Insert or replace one driver, copying and swapping the snapshot.
    pub fn put(&self, driver: Arc<Driver>) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let next = self.current.load().with_driver(driver);
        self.current.store(Arc::new(next));
    }

    /// Configure from `load` exactly once if still unconfigured.
    pub fn ensure_configured<F>(&self, load: F) -> Result<(), GatewayError>
    where
        F: FnOnce() -> Result<PropertySet, GatewayError>,
    {
        if !self.current.load().is_empty() {
            return Ok(());
        }
        // Re-check under the writer lock so concurrent callers load once.
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.current.load().is_empty() {
            return Ok(());
        }
        let snapshot = Self::build_snapshot(&load()?)?;
        self.current.store(Arc::new(snapshot));
        tracing::info!("Driver registry configured");
        Ok(())
    }

    /// Driver by name; an empty name means `default`.
    pub fn instance(&self, name: &str) -> Result<Arc<Driver>, GatewayError> {
        let snapshot = self.current.load();
        self.instance_in(&snapshot, name)
    }

    /// First driver whose mapping matches, with the matched mapping.
    ///
    /// Both lookups read the same snapshot, so a concurrent reconfigure
    /// can never pair a mapping with a foreign instance table.
    pub fn instance_for(
        &self,
        scheme: &str,
        host: &str,
        path: &str,
    ) -> Result<(Arc<Driver>, UriMapping), GatewayError> {
        let snapshot = self.current.load();
        for (mapping, name) in &snapshot.mappings {
            if mapping.matches(scheme, host, path) {
                let driver = self.instance_in(&snapshot, name)?;
                return Ok((driver, mapping.clone()));
            }
        }
        Err(GatewayError::NoMappingFound {
            url: format!("{scheme}://{host}{path}"),
        })
    }

    fn instance_in(
        &self,
        snapshot: &RegistrySnapshot,
        name: &str,
    ) -> Result<Arc<Driver>, GatewayError> {
        let name = if name.is_empty() {
            DEFAULT_INSTANCE_NAME
        } else {
            name
        };
        if snapshot.instances.is_empty() {
            return Err(GatewayError::Configuration(
                "driver registry has not been configured".into(),
            ));
        }
        snapshot
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Configuration(format!("no configuration found for driver: {name}"))
            })
    }
}
