//! Tree Operations
//!
//! The components that mutate the location tree. Each is a unit struct with
//! associated functions taking a `&TreeStore` borrowed from the caller's
//! transaction; none of them open or commit transactions themselves.
//!
//! - [`VisibilityCascade`] - derives `is_invisible`; hide and unhide
//! - [`SubtreeMover`] - move, create under parent, rename, permanent removal
//! - [`TrashArchive`] - trash, restore, purge and trash listing
//! - [`MainLocationCoordinator`] - swap, main location change, fallback
//! - [`AssignmentMaterializer`] - pending assignments to locations

pub mod error;
mod main_location;
mod materializer;
mod mover;
mod trash;
mod visibility;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::TreeError;
pub use main_location::MainLocationCoordinator;
pub use materializer::AssignmentMaterializer;
pub use mover::{MoveOutcome, SubtreeMover};
pub use trash::TrashArchive;
pub use visibility::{MoveVisibility, UnhideOutcome, VisibilityCascade};
