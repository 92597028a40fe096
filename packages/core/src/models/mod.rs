//! Data Models
//!
//! This module contains the data structures of the location tree:
//!
//! - `LocationNode` - one placement of a content item in the tree
//! - `NodeAssignment` - a placement requested before publish
//! - `TrashEntry` - a placement removed from the live tree, restorable later
//! - `MaterializedPath` / `IdentificationPath` - the path codec

mod location;
pub mod path;

pub use location::{
    AssignmentOpCode, ContentId, ContentStatus, CreateLocationParams, LocationId, LocationNode,
    LocationUpdate, MainLocation, NewLocation, NewNodeAssignment, NodeAssignment, SortField,
    SortOrder, TrashEntry, ValidationError,
};
pub use path::{IdentificationPath, MaterializedPath, PathParseError, ROOT_OFFSET};
