//! Business Services
//!
//! - `LocationService` - transactional facade over the tree operations,
//!   emitting `TreeEvent`s after each committed mutation
//!
//! Services coordinate between the database layer and the operations layer,
//! owning the transaction boundary so the components never have to.

pub mod location_service;

pub use location_service::LocationService;
