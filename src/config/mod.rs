//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & flatten to `prefix.key` properties)
//!     → PropertySet (ordered, string-valued)
//!     → registry::configure (group by prefix, build drivers)
//!     → atomic snapshot swap
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → loader.rs loads new properties
//!     → registry::configure builds a fresh snapshot
//!     → readers observe the new snapshot on their next lookup
//! ```
//!
//! # Design Decisions
//! - Settings stay flat strings; typing happens at the accessor
//! - Declaration order is part of the contract (mapping precedence)
//! - A reload that fails to parse keeps the current configuration

pub mod loader;
pub mod properties;
pub mod watcher;

pub use loader::{load_properties, resolve_config_path, ConfigError};
pub use properties::{params, PropertySet};
