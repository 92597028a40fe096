//! Location Service
//!
//! Transactional facade over the tree operations. Every mutating method:
//!
//! 1. Opens a fresh connection and issues `BEGIN IMMEDIATE`, taking SQLite's
//!    write lock up front so read-compute-write sequences of concurrent
//!    callers are serialized
//! 2. Runs the operation against a `TreeStore` borrowing that connection
//! 3. Commits on success, rolls back on any error
//! 4. Emits a `TreeEvent` only after a successful commit
//!
//! Single-row and listing reads run on their own connection without an
//! explicit transaction.

use crate::config::TreeConfig;
use crate::db::{
    ContentGateway, DatabaseError, LanguageSelection, SqlContentGateway, SqlTrashQueryConverter,
    TranslationFilter, TrashCriterion, TrashQuery, TrashQueryConverter, TrashResult, TreeDatabase,
    TreeEvent, TreeStore,
};
use crate::models::{
    ContentId, CreateLocationParams, LocationId, LocationNode, LocationUpdate, MainLocation,
    NewLocation, NewNodeAssignment, NodeAssignment, TrashEntry,
};
use crate::operations::{
    AssignmentMaterializer, MainLocationCoordinator, MoveOutcome, SubtreeMover, TrashArchive,
    TreeError, UnhideOutcome, VisibilityCascade,
};
use libsql::Connection;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Transactional entry point to the location tree
///
/// Cheap to clone; clones share the database, collaborators and event channel.
///
/// # Examples
///
/// ```no_run
/// # use arbor_core::config::TreeConfig;
/// # use arbor_core::services::LocationService;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = LocationService::new(TreeConfig::with_database_path("./data/tree.db")).await?;
/// let root = service.create_root(1, 1).await?;
///
/// let mut rx = service.subscribe_to_events();
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("Event: {}", event.event_type());
///     }
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocationService {
    db: TreeDatabase,

    /// Content store seam (status transitions, hidden content)
    gateway: Arc<dyn ContentGateway>,

    /// Builds filter/sort SQL for trash listings
    trash_converter: Arc<dyn TrashQueryConverter>,

    /// Optional language service used to narrow lookups by content
    translations: Option<Arc<dyn TranslationFilter>>,

    id_batch_size: usize,

    /// Broadcast channel for domain events
    event_tx: broadcast::Sender<TreeEvent>,
}

impl LocationService {
    /// Open the database described by `config` with the default collaborators
    pub async fn new(config: TreeConfig) -> Result<Self, TreeError> {
        let db = TreeDatabase::new(config.clone()).await?;
        Ok(Self::from_database(db, &config))
    }

    pub fn from_database(db: TreeDatabase, config: &TreeConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Self {
            db,
            gateway: Arc::new(SqlContentGateway::new()),
            trash_converter: Arc::new(SqlTrashQueryConverter),
            translations: None,
            id_batch_size: config.id_batch_size,
            event_tx,
        }
    }

    pub fn with_content_gateway(mut self, gateway: Arc<dyn ContentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_trash_converter(mut self, converter: Arc<dyn TrashQueryConverter>) -> Self {
        self.trash_converter = converter;
        self
    }

    pub fn with_translation_filter(mut self, translations: Arc<dyn TranslationFilter>) -> Self {
        self.translations = Some(translations);
        self
    }

    /// Get access to the underlying database
    pub fn database(&self) -> &TreeDatabase {
        &self.db
    }

    /// Subscribe to domain events emitted after committed mutations
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a domain event to all subscribers
    ///
    /// Ignores errors if no subscribers (expected in some tests).
    fn emit_event(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    fn store<'c>(&self, conn: &'c Connection) -> TreeStore<'c> {
        TreeStore::new(conn).with_id_batch_size(self.id_batch_size)
    }

    async fn begin(&self) -> Result<Connection, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(conn)
    }

    /// Commit on success, roll back on error
    async fn finish<T>(
        &self,
        conn: &Connection,
        result: Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        match result {
            Ok(value) => match conn.execute("COMMIT", ()).await {
                Ok(_) => Ok(value),
                Err(e) => {
                    Self::rollback(conn).await;
                    Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    ))
                    .into())
                }
            },
            Err(e) => {
                Self::rollback(conn).await;
                tracing::warn!("Tree operation rolled back: {}", e);
                Err(e)
            }
        }
    }

    async fn rollback(conn: &Connection) {
        if let Err(e) = conn.execute("ROLLBACK", ()).await {
            tracing::warn!("Rollback failed: {}", e);
        }
    }

    async fn require_location(
        store: &TreeStore<'_>,
        id: LocationId,
    ) -> Result<LocationNode, TreeError> {
        store
            .get_location(id)
            .await?
            .ok_or_else(|| TreeError::location_not_found(id))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn load_location(&self, id: LocationId) -> Result<LocationNode, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::require_location(&self.store(&conn), id).await
    }

    pub async fn load_location_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<LocationNode, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.store(&conn)
            .get_location_by_remote_id(remote_id)
            .await?
            .ok_or_else(|| TreeError::RemoteIdNotFound(remote_id.to_string()))
    }

    pub async fn load_root(&self) -> Result<Option<LocationNode>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.store(&conn).find_root().await?)
    }

    /// Placements of a content item, optionally narrowed to `languages`
    ///
    /// Without a configured translation filter, or when a language is
    /// unknown, the unfiltered list is returned.
    pub async fn load_locations_by_content(
        &self,
        content_id: ContentId,
        languages: Option<&[String]>,
    ) -> Result<Vec<LocationNode>, TreeError> {
        let selection = match (languages, self.translations.as_deref()) {
            (Some(languages), Some(filter)) => Some(LanguageSelection::new(filter, languages)),
            (Some(_), None) => {
                tracing::warn!(
                    "No translation filter configured; listing content {} unfiltered",
                    content_id
                );
                None
            }
            (None, _) => None,
        };

        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .store(&conn)
            .find_locations_by_content(content_id, selection)
            .await?)
    }

    pub async fn load_locations_by_contents(
        &self,
        content_ids: &[ContentId],
    ) -> Result<Vec<LocationNode>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .store(&conn)
            .find_locations_by_contents(content_ids)
            .await?)
    }

    pub async fn load_children(
        &self,
        parent_id: LocationId,
    ) -> Result<Vec<LocationNode>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.store(&conn).find_children(parent_id).await?)
    }

    pub async fn count_children(&self, parent_id: LocationId) -> Result<i64, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.store(&conn).count_children(parent_id).await?)
    }

    /// The subtree rooted at `id`, root included, shallowest first
    pub async fn load_subtree(&self, id: LocationId) -> Result<Vec<LocationNode>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        let store = self.store(&conn);
        let location = Self::require_location(&store, id).await?;
        Ok(store.find_subtree(&location.path).await?)
    }

    pub async fn load_parent_locations_for_draft(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<LocationNode>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .store(&conn)
            .find_parent_locations_for_draft(content_id)
            .await?)
    }

    pub async fn load_trash_entry(&self, trash_id: LocationId) -> Result<TrashEntry, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        self.store(&conn)
            .get_trash(trash_id)
            .await?
            .ok_or_else(|| TreeError::trash_entry_not_found(trash_id))
    }

    pub async fn find_trash_items(&self, query: &TrashQuery) -> Result<TrashResult, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        TrashArchive::find_trash_items(&self.store(&conn), self.trash_converter.as_ref(), query)
            .await
    }

    pub async fn count_trashed(
        &self,
        criterion: Option<&TrashCriterion>,
    ) -> Result<usize, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        TrashArchive::count_trashed(&self.store(&conn), self.trash_converter.as_ref(), criterion)
            .await
    }

    pub async fn find_assignments(
        &self,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<Vec<NodeAssignment>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .store(&conn)
            .find_assignments(content_id, content_version)
            .await?)
    }

    /// Lowest-id remaining placement of `content_id`, skipping `excluding`
    pub async fn fallback_main_location(
        &self,
        content_id: ContentId,
        excluding: LocationId,
    ) -> Result<Option<LocationId>, TreeError> {
        let conn = self.db.connect_with_timeout().await?;
        MainLocationCoordinator::fallback_main_node(&self.store(&conn), content_id, excluding).await
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Bootstrap the tree root
    pub async fn create_root(
        &self,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<LocationNode, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<LocationNode, TreeError> = async {
            if let Some(existing) = store.find_root().await? {
                return Err(TreeError::invalid_operation(format!(
                    "tree already has root location {}",
                    existing.id
                )));
            }
            Ok(store.insert_root(content_id, content_version, None).await?)
        }
        .await;

        let root = self.finish(&conn, result).await?;
        tracing::info!("Created tree root {}", root.id);
        self.emit_event(TreeEvent::LocationCreated {
            location: root.clone(),
        });
        Ok(root)
    }

    /// Place a content item under `parent_id`
    ///
    /// Invisibility is derived from the parent and the content; the first
    /// placement of a content item becomes its main location.
    pub async fn create_location(
        &self,
        parent_id: LocationId,
        params: CreateLocationParams,
    ) -> Result<LocationNode, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<LocationNode, TreeError> = async {
            let parent = Self::require_location(&store, parent_id).await?;
            let content_hidden = self.gateway.is_hidden(&conn, params.content_id).await?;
            let main_location = match store.main_location_id(params.content_id).await? {
                Some(main_id) => MainLocation::Existing(main_id),
                None => MainLocation::ThisLocation,
            };

            let new = NewLocation {
                content_id: params.content_id,
                content_version: params.content_version,
                identification_segment: params.identification_segment.clone(),
                priority: params.priority,
                sort_field: params.sort_field,
                sort_order: params.sort_order,
                remote_id: params.remote_id.clone(),
                is_hidden: params.hidden,
                is_invisible: VisibilityCascade::invisible_under(
                    &parent,
                    params.hidden,
                    content_hidden,
                ),
                main_location,
            };
            SubtreeMover::create_under_parent(&store, &parent, &new).await
        }
        .await;

        let location = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::LocationCreated {
            location: location.clone(),
        });
        Ok(location)
    }

    /// Change ordering/lookup metadata; tree shape is untouched
    pub async fn update_location(
        &self,
        id: LocationId,
        update: LocationUpdate,
    ) -> Result<LocationNode, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<LocationNode, TreeError> = async {
            Self::require_location(&store, id).await?;
            store.update_location(id, &update).await?;
            Self::require_location(&store, id).await
        }
        .await;

        let location = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::LocationUpdated {
            location: location.clone(),
        });
        Ok(location)
    }

    /// Change the identification segment of `id` and rebase its subtree
    pub async fn rename_path_segment(
        &self,
        id: LocationId,
        segment: &str,
    ) -> Result<LocationNode, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<LocationNode, TreeError> = async {
            let location = Self::require_location(&store, id).await?;
            SubtreeMover::rename_path_segment(&store, &location, segment).await?;
            Self::require_location(&store, id).await
        }
        .await;

        let location = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::LocationUpdated {
            location: location.clone(),
        });
        Ok(location)
    }

    /// Repoint every placement of a content item to a newly published version
    pub async fn update_locations_content_version(
        &self,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<u64, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<u64, TreeError> = store
            .update_locations_content_version(content_id, content_version)
            .await
            .map_err(TreeError::from);

        let affected = self.finish(&conn, result).await?;
        tracing::debug!(
            "Content {} now exposes version {} on {} locations",
            content_id,
            content_version,
            affected
        );
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Structure and visibility
    // ------------------------------------------------------------------

    pub async fn move_subtree(
        &self,
        source_id: LocationId,
        destination_id: LocationId,
    ) -> Result<MoveOutcome, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<MoveOutcome, TreeError> = async {
            let source = Self::require_location(&store, source_id).await?;
            let destination = Self::require_location(&store, destination_id).await?;
            SubtreeMover::move_subtree(&store, &source, &destination).await
        }
        .await;

        let outcome = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::SubtreeMoved {
            location_id: source_id,
            old_parent_id: outcome.old_parent_id,
            new_parent_id: outcome.new_parent_id,
            affected: outcome.affected,
        });
        Ok(outcome)
    }

    /// Hide `id` and make its whole subtree invisible; returns rows touched
    pub async fn hide(&self, id: LocationId) -> Result<u64, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<u64, TreeError> = async {
            let location = Self::require_location(&store, id).await?;
            VisibilityCascade::hide(&store, &location).await
        }
        .await;

        let affected = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::SubtreeHidden {
            location_id: id,
            affected: affected as usize,
        });
        Ok(affected)
    }

    pub async fn unhide(&self, id: LocationId) -> Result<UnhideOutcome, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<UnhideOutcome, TreeError> = async {
            let location = Self::require_location(&store, id).await?;
            VisibilityCascade::unhide(&store, self.gateway.as_ref(), &location).await
        }
        .await;

        let outcome = self.finish(&conn, result).await?;
        if let UnhideOutcome::Unhidden { made_visible } = outcome {
            self.emit_event(TreeEvent::SubtreeUnhidden {
                location_id: id,
                affected: made_visible as usize,
            });
        }
        Ok(outcome)
    }

    /// Permanently delete `id` and all of its descendants
    pub async fn remove_subtree(&self, id: LocationId) -> Result<Vec<LocationId>, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<Vec<LocationNode>, TreeError> = async {
            let location = Self::require_location(&store, id).await?;
            SubtreeMover::remove_subtree(&store, &location).await
        }
        .await;

        let removed_ids: Vec<LocationId> = self
            .finish(&conn, result)
            .await?
            .iter()
            .map(|l| l.id)
            .collect();
        self.emit_event(TreeEvent::SubtreeRemoved {
            location_id: id,
            removed_ids: removed_ids.clone(),
        });
        Ok(removed_ids)
    }

    // ------------------------------------------------------------------
    // Trash
    // ------------------------------------------------------------------

    pub async fn trash(&self, id: LocationId) -> Result<TrashEntry, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<TrashEntry, TreeError> = async {
            let location = Self::require_location(&store, id).await?;
            TrashArchive::trash(&store, self.gateway.as_ref(), &location).await
        }
        .await;

        let entry = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::LocationTrashed {
            location_id: entry.id,
            content_id: entry.content_id,
        });
        Ok(entry)
    }

    /// Restore a trash entry under `new_parent_id` (or its original parent)
    pub async fn untrash(
        &self,
        trash_id: LocationId,
        new_parent_id: Option<LocationId>,
    ) -> Result<LocationNode, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result =
            TrashArchive::untrash(&store, self.gateway.as_ref(), trash_id, new_parent_id).await;

        let location = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::LocationRestored {
            trash_id,
            location: location.clone(),
        });
        Ok(location)
    }

    pub async fn remove_trash_entry(&self, trash_id: LocationId) -> Result<(), TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result = TrashArchive::remove_entry(&store, trash_id).await;

        self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::TrashPurged { count: 1 });
        Ok(())
    }

    /// Purge the whole trash; returns how many entries were removed
    pub async fn empty_trash(&self) -> Result<u64, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result = TrashArchive::cleanup(&store).await;

        let purged = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::TrashPurged {
            count: purged as usize,
        });
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // Main locations
    // ------------------------------------------------------------------

    pub async fn swap(&self, first_id: LocationId, second_id: LocationId) -> Result<(), TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result = MainLocationCoordinator::swap(&store, first_id, second_id).await;

        self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::LocationsSwapped {
            first_id,
            second_id,
        });
        Ok(())
    }

    pub async fn change_main_location(
        &self,
        content_id: ContentId,
        main_location_id: LocationId,
        content_version: i64,
        parent_location_id: LocationId,
    ) -> Result<(), TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result = MainLocationCoordinator::change_main_location(
            &store,
            content_id,
            main_location_id,
            content_version,
            parent_location_id,
        )
        .await;

        self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::MainLocationChanged {
            content_id,
            main_location_id,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Node assignments
    // ------------------------------------------------------------------

    pub async fn create_assignment(
        &self,
        assignment: NewNodeAssignment,
    ) -> Result<NodeAssignment, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<NodeAssignment, TreeError> = async {
            let parent = Self::require_location(&store, assignment.parent_location_id).await?;
            let assignment = NewNodeAssignment {
                parent_remote_id: parent.remote_id,
                ..assignment
            };
            Ok(store.insert_assignment(&assignment).await?)
        }
        .await;

        self.finish(&conn, result).await
    }

    /// Delete the assignments of a content item, or of one of its versions
    pub async fn delete_assignments(
        &self,
        content_id: ContentId,
        content_version: Option<i64>,
    ) -> Result<u64, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result: Result<u64, TreeError> = store
            .delete_assignments(content_id, content_version)
            .await
            .map_err(TreeError::from);

        self.finish(&conn, result).await
    }

    /// Turn the pending "create" assignments of a content version into locations
    pub async fn materialize_assignments(
        &self,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<Vec<LocationNode>, TreeError> {
        let conn = self.begin().await?;
        let store = self.store(&conn);

        let result = AssignmentMaterializer::materialize(
            &store,
            self.gateway.as_ref(),
            content_id,
            content_version,
        )
        .await;

        let created = self.finish(&conn, result).await?;
        self.emit_event(TreeEvent::AssignmentsMaterialized {
            content_id,
            content_version,
            location_ids: created.iter().map(|l| l.id).collect(),
        });
        Ok(created)
    }
}
