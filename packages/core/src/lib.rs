//! Arbor Core Location Tree Engine
//!
//! This crate maintains the hierarchical placement of content items: every
//! content item appears at one or more locations, exactly one of which is its
//! main location, and every location carries a materialized id path plus a
//! human-readable identification path.
//!
//! # Architecture
//!
//! - **Materialized paths**: `/1/5/2/` id paths make subtree reads a prefix match
//! - **Hidden vs invisible**: explicit hiding is stored per node, invisibility
//!   is the derived effect of any hidden ancestor or hidden content
//! - **libsql**: embedded SQLite-compatible database; each service call runs in
//!   a single `BEGIN IMMEDIATE` transaction
//!
//! # Modules
//!
//! - [`models`] - Data structures (LocationNode, NodeAssignment, TrashEntry, paths)
//! - [`db`] - Database layer: schema, `TreeStore` primitives, trash queries, events
//! - [`operations`] - Tree components (mover, visibility, trash, main locations, materializer)
//! - [`services`] - `LocationService`, the transactional entry point
//! - [`config`] - Engine configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use operations::{MoveOutcome, TreeError, UnhideOutcome};
pub use services::*;
