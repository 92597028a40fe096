//! Location Data Structures
//!
//! A location is one placement of one content item in the tree. Besides the
//! structural fields (`parent_id`, `path`, `depth`) every location stores two
//! pieces of derived state that the operations layer keeps coherent:
//!
//! - `is_invisible` - true iff the node, its content, or any ancestor is hidden
//! - `main_location_id` - read from the per-content main location table, so all
//!   placements of one content item always agree on it
//!
//! Pending placements requested before publish are [`NodeAssignment`]s; removed
//! placements waiting for restore or purge are [`TrashEntry`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::path::{IdentificationPath, MaterializedPath};

/// Location (tree node) identifier
pub type LocationId = i64;

/// Content item identifier
pub type ContentId = i64;

/// Validation errors for location model values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown sort field code: {0}")]
    InvalidSortField(i64),

    #[error("Unknown sort order code: {0}")]
    InvalidSortOrder(i64),

    #[error("Unknown assignment op code: {0}")]
    InvalidOpCode(i64),

    #[error("Unknown content status code: {0}")]
    InvalidContentStatus(i64),
}

/// Field children of a location are sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Path,
    Published,
    Modified,
    Section,
    Depth,
    ContentTypeIdentifier,
    ContentTypeName,
    Priority,
    Name,
    LocationId,
    ContentId,
}

impl SortField {
    pub fn code(self) -> i64 {
        match self {
            SortField::Path => 1,
            SortField::Published => 2,
            SortField::Modified => 3,
            SortField::Section => 4,
            SortField::Depth => 5,
            SortField::ContentTypeIdentifier => 6,
            SortField::ContentTypeName => 7,
            SortField::Priority => 8,
            SortField::Name => 9,
            SortField::LocationId => 11,
            SortField::ContentId => 12,
        }
    }
}

impl TryFrom<i64> for SortField {
    type Error = ValidationError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => SortField::Path,
            2 => SortField::Published,
            3 => SortField::Modified,
            4 => SortField::Section,
            5 => SortField::Depth,
            6 => SortField::ContentTypeIdentifier,
            7 => SortField::ContentTypeName,
            8 => SortField::Priority,
            9 => SortField::Name,
            11 => SortField::LocationId,
            12 => SortField::ContentId,
            other => return Err(ValidationError::InvalidSortField(other)),
        })
    }
}

/// Direction children are sorted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Descending,
    #[default]
    Ascending,
}

impl SortOrder {
    pub fn code(self) -> i64 {
        match self {
            SortOrder::Descending => 0,
            SortOrder::Ascending => 1,
        }
    }
}

impl TryFrom<i64> for SortOrder {
    type Error = ValidationError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(SortOrder::Descending),
            1 => Ok(SortOrder::Ascending),
            other => Err(ValidationError::InvalidSortOrder(other)),
        }
    }
}

/// Publication status of a content item, as owned by the content store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
    Trashed,
}

impl ContentStatus {
    pub fn code(self) -> i64 {
        match self {
            ContentStatus::Draft => 0,
            ContentStatus::Published => 1,
            ContentStatus::Trashed => 2,
        }
    }
}

impl TryFrom<i64> for ContentStatus {
    type Error = ValidationError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ContentStatus::Draft),
            1 => Ok(ContentStatus::Published),
            2 => Ok(ContentStatus::Trashed),
            other => Err(ValidationError::InvalidContentStatus(other)),
        }
    }
}

/// One placement of one content item in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationNode {
    /// Stable for the life of the placement
    pub id: LocationId,

    /// Structural parent; `None` marks the tree root
    pub parent_id: Option<LocationId>,

    pub content_id: ContentId,

    /// Content version this placement currently exposes
    pub content_version: i64,

    /// Ancestor ids including self, root first
    pub path: MaterializedPath,

    /// Parallel path of human-chosen segment keys
    pub path_identification: IdentificationPath,

    pub depth: i64,

    pub priority: i64,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub remote_id: String,

    /// Explicit hide flag set directly on this node
    pub is_hidden: bool,

    /// Derived: hidden itself, content hidden, or under a hidden ancestor
    pub is_invisible: bool,

    /// Main placement of `content_id`
    pub main_location_id: Option<LocationId>,
}

impl LocationNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_main(&self) -> bool {
        self.main_location_id == Some(self.id)
    }

    /// Hidden or invisible; children created or moved here start out invisible
    pub fn hides_children(&self) -> bool {
        self.is_hidden || self.is_invisible
    }
}

/// How a newly created location relates to its content's main location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainLocation {
    /// The new location becomes the main location
    ThisLocation,
    /// Keep pointing at an existing main location
    Existing(LocationId),
}

/// Parameters for creating a location under an existing parent
///
/// The id and final path are generated by the store; depth, path and parent
/// are taken from the parent node.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub content_id: ContentId,
    pub content_version: i64,
    pub identification_segment: String,
    pub priority: i64,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    /// Generated when `None`
    pub remote_id: Option<String>,
    pub is_hidden: bool,
    pub is_invisible: bool,
    pub main_location: MainLocation,
}

impl NewLocation {
    pub fn new(content_id: ContentId, content_version: i64) -> Self {
        Self {
            content_id,
            content_version,
            identification_segment: String::new(),
            priority: 0,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            remote_id: None,
            is_hidden: false,
            is_invisible: false,
            main_location: MainLocation::ThisLocation,
        }
    }
}

/// Placement request as accepted by the service layer
///
/// Unlike [`NewLocation`] it carries no derived state: invisibility and the
/// main-location pointer are computed from the tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationParams {
    pub content_id: ContentId,
    pub content_version: i64,
    #[serde(default)]
    pub identification_segment: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub sort_field: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// Sparse update of ordering/lookup metadata
///
/// Only provided fields change; tree shape is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub priority: Option<i64>,
    pub remote_id: Option<String>,
    pub sort_field: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

impl LocationUpdate {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.remote_id.is_none()
            && self.sort_field.is_none()
            && self.sort_order.is_none()
    }
}

/// Lifecycle state of a node assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOpCode {
    Nop,
    Execute,
    CreateNop,
    Create,
    MoveNop,
    Move,
    RemoveNop,
    Remove,
    SetNop,
    Set,
}

impl AssignmentOpCode {
    pub fn code(self) -> i64 {
        match self {
            AssignmentOpCode::Nop => 0,
            AssignmentOpCode::Execute => 1,
            AssignmentOpCode::CreateNop => 2,
            AssignmentOpCode::Create => 3,
            AssignmentOpCode::MoveNop => 4,
            AssignmentOpCode::Move => 5,
            AssignmentOpCode::RemoveNop => 6,
            AssignmentOpCode::Remove => 7,
            AssignmentOpCode::SetNop => 8,
            AssignmentOpCode::Set => 9,
        }
    }
}

impl TryFrom<i64> for AssignmentOpCode {
    type Error = ValidationError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => AssignmentOpCode::Nop,
            1 => AssignmentOpCode::Execute,
            2 => AssignmentOpCode::CreateNop,
            3 => AssignmentOpCode::Create,
            4 => AssignmentOpCode::MoveNop,
            5 => AssignmentOpCode::Move,
            6 => AssignmentOpCode::RemoveNop,
            7 => AssignmentOpCode::Remove,
            8 => AssignmentOpCode::SetNop,
            9 => AssignmentOpCode::Set,
            other => return Err(ValidationError::InvalidOpCode(other)),
        })
    }
}

/// Pending placement request for a content version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAssignment {
    pub id: i64,
    pub content_id: ContentId,
    pub content_version: i64,
    pub parent_location_id: LocationId,
    pub is_main: bool,
    pub op_code: AssignmentOpCode,
    /// Remote id of the parent location at request time
    pub parent_remote_id: String,
    pub priority: i64,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub is_hidden: bool,
}

/// Parameters for recording a node assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNodeAssignment {
    pub content_id: ContentId,
    pub content_version: i64,
    pub parent_location_id: LocationId,
    pub is_main: bool,
    pub op_code: AssignmentOpCode,
    pub parent_remote_id: String,
    pub priority: i64,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub is_hidden: bool,
}

impl NewNodeAssignment {
    /// A "create" request under `parent_location_id` with default ordering
    pub fn create(
        content_id: ContentId,
        content_version: i64,
        parent_location_id: LocationId,
        is_main: bool,
    ) -> Self {
        Self {
            content_id,
            content_version,
            parent_location_id,
            is_main,
            op_code: AssignmentOpCode::Create,
            parent_remote_id: String::new(),
            priority: 0,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            is_hidden: false,
        }
    }
}

/// Snapshot of a location removed from the live tree
///
/// Derived fields (invisibility, main pointer) are dropped; they are
/// recomputed against the new parent on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashEntry {
    /// Id the location had while live; doubles as the trash id
    pub id: LocationId,
    pub parent_id: Option<LocationId>,
    pub content_id: ContentId,
    pub content_version: i64,
    pub path: MaterializedPath,
    pub path_identification: IdentificationPath,
    pub depth: i64,
    pub priority: i64,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub remote_id: String,
    pub is_hidden: bool,
    pub trashed_at: DateTime<Utc>,
}

impl TrashEntry {
    pub fn from_location(location: &LocationNode, trashed_at: DateTime<Utc>) -> Self {
        Self {
            id: location.id,
            parent_id: location.parent_id,
            content_id: location.content_id,
            content_version: location.content_version,
            path: location.path.clone(),
            path_identification: location.path_identification.clone(),
            depth: location.depth,
            priority: location.priority,
            sort_field: location.sort_field,
            sort_order: location.sort_order,
            remote_id: location.remote_id.clone(),
            is_hidden: location.is_hidden,
            trashed_at,
        }
    }
}
