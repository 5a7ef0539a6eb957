//! Fragment-block extraction subsystem.
//!
//! # Data Flow
//! ```text
//! fetched page (character stream)
//!     → parser.rs (scan for <!--$ ... --> markers)
//!     → block.rs (capture between matching begin/end markers)
//!     → include.rs (record include markers for later splicing)
//!     → captured fragment / composed page
//! ```
//!
//! # Design Decisions
//! - Single pass, stream oriented, no state shared across requests
//! - Each render owns its renderer and stack; no locking needed
//! - Marker syntax errors are fatal to the render, never swallowed

pub mod block;
pub mod include;
pub mod parser;

pub use block::BlockRenderer;
pub use include::{AggregateRenderer, IncludeDirective};
