//! Domain Events for the location tree
//!
//! This module defines the domain events emitted by `LocationService` after a
//! mutating operation commits. Observers such as a search indexer subscribe to
//! them to re-index affected content and locations without coupling to the
//! storage layer.
//!
//! # Architecture
//!
//! Events are emitted using tokio's broadcast channel, allowing multiple subscribers
//! to receive notifications asynchronously.
//!
//! # Event Flow
//!
//! 1. `LocationService` runs an operation inside one transaction
//! 2. The transaction commits
//! 3. A domain event is emitted via broadcast channel
//! 4. All subscribers receive the event asynchronously
//!
//! A rolled-back operation emits nothing.

use crate::models::{ContentId, LocationId, LocationNode};
use serde::{Deserialize, Serialize};

/// Domain events emitted by `LocationService`
///
/// These represent tree-level changes, not database operations. Bulk
/// operations report the subtree root and the number of rows touched rather
/// than every affected row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    /// A location was placed in the tree
    #[serde(rename = "location:created")]
    LocationCreated { location: LocationNode },

    /// Ordering or lookup metadata of a location changed
    #[serde(rename = "location:updated")]
    LocationUpdated { location: LocationNode },

    /// A subtree was moved under a new parent
    #[serde(rename = "subtree:moved", rename_all = "camelCase")]
    SubtreeMoved {
        location_id: LocationId,
        old_parent_id: Option<LocationId>,
        new_parent_id: LocationId,
        affected: usize,
    },

    #[serde(rename = "subtree:hidden", rename_all = "camelCase")]
    SubtreeHidden {
        location_id: LocationId,
        affected: usize,
    },

    #[serde(rename = "subtree:unhidden", rename_all = "camelCase")]
    SubtreeUnhidden {
        location_id: LocationId,
        affected: usize,
    },

    /// A location was converted into a trash entry
    #[serde(rename = "location:trashed", rename_all = "camelCase")]
    LocationTrashed {
        location_id: LocationId,
        content_id: ContentId,
    },

    /// A trash entry was restored as a new location
    #[serde(rename = "location:restored", rename_all = "camelCase")]
    LocationRestored {
        trash_id: LocationId,
        location: LocationNode,
    },

    #[serde(rename = "locations:swapped", rename_all = "camelCase")]
    LocationsSwapped {
        first_id: LocationId,
        second_id: LocationId,
    },

    #[serde(rename = "mainLocation:changed", rename_all = "camelCase")]
    MainLocationChanged {
        content_id: ContentId,
        main_location_id: LocationId,
    },

    /// A subtree was permanently removed
    #[serde(rename = "subtree:removed", rename_all = "camelCase")]
    SubtreeRemoved {
        location_id: LocationId,
        removed_ids: Vec<LocationId>,
    },

    /// Pending "create" assignments of a content version became locations
    #[serde(rename = "assignments:materialized", rename_all = "camelCase")]
    AssignmentsMaterialized {
        content_id: ContentId,
        content_version: i64,
        location_ids: Vec<LocationId>,
    },

    /// Trash entries were purged for good
    #[serde(rename = "trash:purged", rename_all = "camelCase")]
    TrashPurged { count: usize },
}

impl TreeEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::LocationCreated { .. } => "location:created",
            TreeEvent::LocationUpdated { .. } => "location:updated",
            TreeEvent::SubtreeMoved { .. } => "subtree:moved",
            TreeEvent::SubtreeHidden { .. } => "subtree:hidden",
            TreeEvent::SubtreeUnhidden { .. } => "subtree:unhidden",
            TreeEvent::LocationTrashed { .. } => "location:trashed",
            TreeEvent::LocationRestored { .. } => "location:restored",
            TreeEvent::LocationsSwapped { .. } => "locations:swapped",
            TreeEvent::MainLocationChanged { .. } => "mainLocation:changed",
            TreeEvent::SubtreeRemoved { .. } => "subtree:removed",
            TreeEvent::AssignmentsMaterialized { .. } => "assignments:materialized",
            TreeEvent::TrashPurged { .. } => "trash:purged",
        }
    }
}
