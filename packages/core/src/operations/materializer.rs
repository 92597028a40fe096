//! Assignment Materializer
//!
//! Turns the pending "create" assignments of a content version into real
//! locations at publish time.

use crate::db::{ContentGateway, TreeStore};
use crate::models::{AssignmentOpCode, ContentId, LocationNode, MainLocation, NewLocation};
use crate::operations::error::TreeError;
use crate::operations::mover::SubtreeMover;
use crate::operations::visibility::VisibilityCascade;

pub struct AssignmentMaterializer;

impl AssignmentMaterializer {
    /// Create one location per "create" assignment of `content_id`/`content_version`
    ///
    /// Assignments are processed in ascending id order, so when the content
    /// has no main location yet the first created node becomes main. Each
    /// processed assignment moves to the create-no-op state.
    pub async fn materialize(
        store: &TreeStore<'_>,
        gateway: &dyn ContentGateway,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<Vec<LocationNode>, TreeError> {
        let assignments = store.find_assignments(content_id, content_version).await?;
        let content_hidden = gateway.is_hidden(store.connection(), content_id).await?;

        let mut created = Vec::new();
        for assignment in assignments
            .iter()
            .filter(|a| a.op_code == AssignmentOpCode::Create)
        {
            let parent = store
                .get_location(assignment.parent_location_id)
                .await?
                .ok_or_else(|| TreeError::location_not_found(assignment.parent_location_id))?;

            let main_location = match store.main_location_id(content_id).await? {
                Some(main_id) => MainLocation::Existing(main_id),
                None => MainLocation::ThisLocation,
            };

            let new = NewLocation {
                content_id,
                content_version,
                identification_segment: String::new(),
                priority: assignment.priority,
                sort_field: assignment.sort_field,
                sort_order: assignment.sort_order,
                remote_id: None,
                is_hidden: assignment.is_hidden,
                is_invisible: VisibilityCascade::invisible_under(
                    &parent,
                    assignment.is_hidden,
                    content_hidden,
                ),
                main_location,
            };

            created.push(SubtreeMover::create_under_parent(store, &parent, &new).await?);
            store
                .set_assignment_op_code(assignment.id, AssignmentOpCode::CreateNop)
                .await?;
        }

        tracing::info!(
            "Materialized {} assignments of content {} version {}",
            created.len(),
            content_id,
            content_version
        );
        Ok(created)
    }
}

// Store-backed materializer tests in separate module
#[cfg(test)]
#[path = "materializer_test.rs"]
mod materializer_test;
