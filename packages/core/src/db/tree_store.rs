//! TreeStore - SQL primitives over the location tree
//!
//! Every read and write the engine performs goes through this type. A
//! `TreeStore` borrows a connection on which the caller has already opened a
//! transaction; it never begins, commits or rolls back on its own, so a
//! sequence of calls is atomic exactly when the caller's transaction is.
//!
//! # Design Principles
//!
//! 1. **Plain statements**: one method, one (or one chunked) statement
//! 2. **Option for absence**: single-row fetches return `Option`; whether a
//!    missing row is an error is decided by the operations layer
//! 3. **Row conversion**: `row_to_*` helpers are the only place stored
//!    strings and codes are decoded into model types
//! 4. **Bulk by prefix**: subtree reads and updates use `path_string LIKE
//!    '/1/5/%'`, which includes the subtree root itself

use crate::db::error::DatabaseError;
use crate::db::translation::LanguageSelection;
use crate::db::trash_query::{format_timestamp, SqlFragment};
use crate::models::{
    AssignmentOpCode, ContentId, ContentStatus, IdentificationPath, LocationId, LocationNode,
    LocationUpdate, MainLocation, MaterializedPath, NewLocation, NewNodeAssignment,
    NodeAssignment, SortField, SortOrder, TrashEntry,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::Params;
use libsql::{params, Connection, Row, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Ids bound per `IN (...)` statement unless configured otherwise
pub const DEFAULT_ID_BATCH_SIZE: usize = 500;

const LOCATION_COLUMNS: &str = "l.id, l.parent_id, l.content_id, l.content_version, \
     l.path_string, l.path_identification, l.depth, l.priority, l.sort_field, \
     l.sort_order, l.remote_id, l.is_hidden, l.is_invisible, m.location_id";

const LOCATION_FROM: &str =
    "FROM locations l LEFT JOIN main_locations m ON m.content_id = l.content_id";

const TRASH_COLUMNS: &str = "location_id, parent_id, content_id, content_version, \
     path_string, path_identification, depth, priority, sort_field, sort_order, \
     remote_id, is_hidden, trashed_at";

const ASSIGNMENT_COLUMNS: &str = "id, content_id, content_version, parent_location_id, \
     is_main, op_code, parent_remote_id, priority, sort_field, sort_order, is_hidden";

/// Hidden either explicitly or through its content item
const HIDDEN_CONDITION: &str = "(l.is_hidden = 1 OR COALESCE(c.is_hidden, 0) = 1)";

/// Transaction-scoped access to the tree tables
pub struct TreeStore<'c> {
    conn: &'c Connection,
    id_batch_size: usize,
}

impl<'c> TreeStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            id_batch_size: DEFAULT_ID_BATCH_SIZE,
        }
    }

    pub fn with_id_batch_size(mut self, id_batch_size: usize) -> Self {
        self.id_batch_size = id_batch_size.max(1);
        self
    }

    /// Connection the caller's transaction runs on
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    // ------------------------------------------------------------------
    // Row conversion
    // ------------------------------------------------------------------

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    ///
    /// The store writes RFC3339; SQLite's `CURRENT_TIMESTAMP` format is
    /// accepted for rows written by hand.
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        Err(DatabaseError::invalid_row(
            "trash",
            format!("unable to parse timestamp '{}'", s),
        ))
    }

    /// Convert a row selected with `LOCATION_COLUMNS` into a `LocationNode`
    fn row_to_location(row: &Row) -> Result<LocationNode, DatabaseError> {
        let invalid = |e: &dyn std::fmt::Display| DatabaseError::invalid_row("locations", e);

        let path_string: String = row.get(4)?;
        let path_identification: String = row.get(5)?;
        let depth: i64 = row.get(6)?;

        Ok(LocationNode {
            id: row.get(0)?,
            parent_id: row.get::<Option<i64>>(1)?,
            content_id: row.get(2)?,
            content_version: row.get(3)?,
            path: path_string
                .parse::<MaterializedPath>()
                .map_err(|e| invalid(&e))?,
            path_identification: IdentificationPath::from_stored(&path_identification, depth),
            depth,
            priority: row.get(7)?,
            sort_field: SortField::try_from(row.get::<i64>(8)?).map_err(|e| invalid(&e))?,
            sort_order: SortOrder::try_from(row.get::<i64>(9)?).map_err(|e| invalid(&e))?,
            remote_id: row.get(10)?,
            is_hidden: row.get::<i64>(11)? != 0,
            is_invisible: row.get::<i64>(12)? != 0,
            main_location_id: row.get::<Option<i64>>(13)?,
        })
    }

    fn row_to_trash(row: &Row) -> Result<TrashEntry, DatabaseError> {
        let invalid = |e: &dyn std::fmt::Display| DatabaseError::invalid_row("trash", e);

        let path_string: String = row.get(4)?;
        let path_identification: String = row.get(5)?;
        let depth: i64 = row.get(6)?;
        let trashed_at: String = row.get(12)?;

        Ok(TrashEntry {
            id: row.get(0)?,
            parent_id: row.get::<Option<i64>>(1)?,
            content_id: row.get(2)?,
            content_version: row.get(3)?,
            path: path_string
                .parse::<MaterializedPath>()
                .map_err(|e| invalid(&e))?,
            path_identification: IdentificationPath::from_stored(&path_identification, depth),
            depth,
            priority: row.get(7)?,
            sort_field: SortField::try_from(row.get::<i64>(8)?).map_err(|e| invalid(&e))?,
            sort_order: SortOrder::try_from(row.get::<i64>(9)?).map_err(|e| invalid(&e))?,
            remote_id: row.get(10)?,
            is_hidden: row.get::<i64>(11)? != 0,
            trashed_at: Self::parse_timestamp(&trashed_at)?,
        })
    }

    fn row_to_assignment(row: &Row) -> Result<NodeAssignment, DatabaseError> {
        let invalid = |e: &dyn std::fmt::Display| DatabaseError::invalid_row("node_assignments", e);

        Ok(NodeAssignment {
            id: row.get(0)?,
            content_id: row.get(1)?,
            content_version: row.get(2)?,
            parent_location_id: row.get(3)?,
            is_main: row.get::<i64>(4)? != 0,
            op_code: AssignmentOpCode::try_from(row.get::<i64>(5)?).map_err(|e| invalid(&e))?,
            parent_remote_id: row.get(6)?,
            priority: row.get(7)?,
            sort_field: SortField::try_from(row.get::<i64>(8)?).map_err(|e| invalid(&e))?,
            sort_order: SortOrder::try_from(row.get::<i64>(9)?).map_err(|e| invalid(&e))?,
            is_hidden: row.get::<i64>(10)? != 0,
        })
    }

    async fn query_locations(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let mut rows = self.conn.query(sql, params).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query locations: {}", e))
        })?;

        let mut locations = Vec::new();
        while let Some(row) = rows.next().await? {
            locations.push(Self::row_to_location(&row)?);
        }
        Ok(locations)
    }

    async fn query_ids(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<LocationId>, DatabaseError> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    async fn query_count(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self.conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    // ------------------------------------------------------------------
    // Location reads
    // ------------------------------------------------------------------

    pub async fn get_location(
        &self,
        id: LocationId,
    ) -> Result<Option<LocationNode>, DatabaseError> {
        let sql = format!("SELECT {} {} WHERE l.id = ?", LOCATION_COLUMNS, LOCATION_FROM);
        Ok(self.query_locations(&sql, [id]).await?.into_iter().next())
    }

    /// The tree root, if the tree has been bootstrapped
    pub async fn find_root(&self) -> Result<Option<LocationNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} {} WHERE l.parent_id IS NULL ORDER BY l.id LIMIT 1",
            LOCATION_COLUMNS, LOCATION_FROM
        );
        Ok(self.query_locations(&sql, ()).await?.into_iter().next())
    }

    pub async fn get_location_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<LocationNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} {} WHERE l.remote_id = ?",
            LOCATION_COLUMNS, LOCATION_FROM
        );
        Ok(self
            .query_locations(&sql, [remote_id])
            .await?
            .into_iter()
            .next())
    }

    /// All placements of a content item, optionally narrowed to translations
    ///
    /// An unknown language in `languages` is tolerated: the lookup falls back
    /// to the unfiltered query.
    pub async fn find_locations_by_content(
        &self,
        content_id: ContentId,
        languages: Option<LanguageSelection<'_>>,
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let mask = match languages {
            Some(selection) => match selection.language_mask() {
                Ok(mask) => Some(mask),
                Err(e) => {
                    tracing::warn!(
                        "{}; listing locations of content {} without translation filter",
                        e,
                        content_id
                    );
                    None
                }
            },
            None => None,
        };

        match mask {
            Some(mask) => {
                let sql = format!(
                    "SELECT {} {} JOIN content_objects c ON c.id = l.content_id
                     WHERE l.content_id = ? AND (c.language_mask & ?) != 0
                     ORDER BY l.id",
                    LOCATION_COLUMNS, LOCATION_FROM
                );
                self.query_locations(&sql, params![content_id, mask]).await
            }
            None => {
                let sql = format!(
                    "SELECT {} {} WHERE l.content_id = ? ORDER BY l.id",
                    LOCATION_COLUMNS, LOCATION_FROM
                );
                self.query_locations(&sql, [content_id]).await
            }
        }
    }

    /// Placements of several content items, ordered by content then id
    pub async fn find_locations_by_contents(
        &self,
        content_ids: &[ContentId],
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let mut locations = Vec::new();
        for chunk in content_ids.chunks(self.id_batch_size) {
            let sql = format!(
                "SELECT {} {} WHERE l.content_id IN ({}) ORDER BY l.content_id, l.id",
                LOCATION_COLUMNS,
                LOCATION_FROM,
                placeholders(chunk.len())
            );
            locations.extend(self.query_locations(&sql, id_params(chunk)).await?);
        }
        Ok(locations)
    }

    pub async fn find_locations_by_ids(
        &self,
        ids: &[LocationId],
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let mut locations = Vec::new();
        for chunk in ids.chunks(self.id_batch_size) {
            let sql = format!(
                "SELECT {} {} WHERE l.id IN ({}) ORDER BY l.id",
                LOCATION_COLUMNS,
                LOCATION_FROM,
                placeholders(chunk.len())
            );
            locations.extend(self.query_locations(&sql, id_params(chunk)).await?);
        }
        Ok(locations)
    }

    /// Direct children ordered by priority, then id
    pub async fn find_children(
        &self,
        parent_id: LocationId,
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} {} WHERE l.parent_id = ? ORDER BY l.priority, l.id",
            LOCATION_COLUMNS, LOCATION_FROM
        );
        self.query_locations(&sql, [parent_id]).await
    }

    pub async fn count_children(&self, parent_id: LocationId) -> Result<i64, DatabaseError> {
        self.query_count(
            "SELECT COUNT(*) FROM locations WHERE parent_id = ?",
            [parent_id],
        )
        .await
    }

    /// The subtree rooted at `path`, root included, shallowest first
    pub async fn find_subtree(
        &self,
        path: &MaterializedPath,
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} {} WHERE l.path_string LIKE ? ORDER BY l.depth, l.id",
            LOCATION_COLUMNS, LOCATION_FROM
        );
        self.query_locations(&sql, [path.subtree_pattern()]).await
    }

    /// Parent locations named by pending "create" assignments of a content
    /// item that was never published
    pub async fn find_parent_locations_for_draft(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} {}
             WHERE l.id IN (
                SELECT a.parent_location_id FROM node_assignments a
                LEFT JOIN content_objects c ON c.id = a.content_id
                WHERE a.content_id = ? AND a.op_code = ? AND COALESCE(c.status, ?) = ?
             )
             ORDER BY l.id",
            LOCATION_COLUMNS, LOCATION_FROM
        );
        let draft = ContentStatus::Draft.code();
        self.query_locations(
            &sql,
            params![content_id, AssignmentOpCode::Create.code(), draft, draft],
        )
        .await
    }

    // ------------------------------------------------------------------
    // Location writes
    // ------------------------------------------------------------------

    /// Create the tree root
    pub async fn insert_root(
        &self,
        content_id: ContentId,
        content_version: i64,
        remote_id: Option<String>,
    ) -> Result<LocationNode, DatabaseError> {
        let remote_id = remote_id.unwrap_or_else(generate_remote_id);

        self.conn
            .execute(
                "INSERT INTO locations
                    (parent_id, content_id, content_version, path_string, path_identification,
                     depth, remote_id)
                 VALUES (NULL, ?, ?, '', '', 0, ?)",
                params![content_id, content_version, remote_id.clone()],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert root: {}", e)))?;

        let id = self.conn.last_insert_rowid();
        let path = MaterializedPath::root(id);
        self.conn
            .execute(
                "UPDATE locations SET path_string = ? WHERE id = ?",
                params![path.to_string(), id],
            )
            .await?;
        self.set_main_location(content_id, id).await?;

        Ok(LocationNode {
            id,
            parent_id: None,
            content_id,
            content_version,
            path,
            path_identification: IdentificationPath::root(),
            depth: 0,
            priority: 0,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            remote_id,
            is_hidden: false,
            is_invisible: false,
            main_location_id: Some(id),
        })
    }

    /// Create a location under `parent`
    ///
    /// The row is inserted first to obtain its id, then the final path is
    /// written in a second statement.
    pub async fn insert_location(
        &self,
        parent: &LocationNode,
        new: &NewLocation,
    ) -> Result<LocationNode, DatabaseError> {
        let remote_id = new.remote_id.clone().unwrap_or_else(generate_remote_id);
        let path_identification = parent
            .path_identification
            .child(&new.identification_segment);
        let depth = parent.depth + 1;

        self.conn
            .execute(
                "INSERT INTO locations
                    (parent_id, content_id, content_version, path_string, path_identification,
                     depth, priority, sort_field, sort_order, remote_id, is_hidden, is_invisible)
                 VALUES (?, ?, ?, '', ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    parent.id,
                    new.content_id,
                    new.content_version,
                    path_identification.to_string(),
                    depth,
                    new.priority,
                    new.sort_field.code(),
                    new.sort_order.code(),
                    remote_id.clone(),
                    new.is_hidden as i64,
                    new.is_invisible as i64
                ],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to insert location: {}", e))
            })?;

        let id = self.conn.last_insert_rowid();
        let path = parent.path.child(id);
        self.conn
            .execute(
                "UPDATE locations SET path_string = ? WHERE id = ?",
                params![path.to_string(), id],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to write location path: {}", e))
            })?;

        let main_location_id = match new.main_location {
            MainLocation::ThisLocation => id,
            MainLocation::Existing(main_id) => main_id,
        };
        self.set_main_location(new.content_id, main_location_id)
            .await?;

        Ok(LocationNode {
            id,
            parent_id: Some(parent.id),
            content_id: new.content_id,
            content_version: new.content_version,
            path,
            path_identification,
            depth,
            priority: new.priority,
            sort_field: new.sort_field,
            sort_order: new.sort_order,
            remote_id,
            is_hidden: new.is_hidden,
            is_invisible: new.is_invisible,
            main_location_id: Some(main_location_id),
        })
    }

    /// Apply a sparse metadata update; returns the number of rows changed
    pub async fn update_location(
        &self,
        id: LocationId,
        update: &LocationUpdate,
    ) -> Result<u64, DatabaseError> {
        if update.is_empty() {
            return Ok(0);
        }

        let mut assignments = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(priority) = update.priority {
            assignments.push("priority = ?");
            values.push(Value::from(priority));
        }
        if let Some(remote_id) = &update.remote_id {
            assignments.push("remote_id = ?");
            values.push(Value::from(remote_id.clone()));
        }
        if let Some(sort_field) = update.sort_field {
            assignments.push("sort_field = ?");
            values.push(Value::from(sort_field.code()));
        }
        if let Some(sort_order) = update.sort_order {
            assignments.push("sort_order = ?");
            values.push(Value::from(sort_order.code()));
        }
        values.push(Value::from(id));

        let sql = format!(
            "UPDATE locations SET {} WHERE id = ?",
            assignments.join(", ")
        );
        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to update location {}: {}", id, e))
            })
    }

    /// Write the shape and derived fields of `location`
    ///
    /// Used for rebased rows after a move or an identification rename.
    pub async fn write_shape(&self, location: &LocationNode) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE locations
                 SET parent_id = ?, path_string = ?, path_identification = ?, depth = ?,
                     is_invisible = ?
                 WHERE id = ?",
                params![
                    nullable(location.parent_id),
                    location.path.to_string(),
                    location.path_identification.to_string(),
                    location.depth,
                    location.is_invisible as i64,
                    location.id
                ],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to write shape of location {}: {}",
                    location.id, e
                ))
            })?;
        Ok(())
    }

    pub async fn set_hidden(&self, id: LocationId, hidden: bool) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute(
                "UPDATE locations SET is_hidden = ? WHERE id = ?",
                params![hidden as i64, id],
            )
            .await?)
    }

    /// Set `is_invisible` on the whole subtree rooted at `path`
    pub async fn set_invisible_by_prefix(
        &self,
        path: &MaterializedPath,
        invisible: bool,
    ) -> Result<u64, DatabaseError> {
        self.conn
            .execute(
                "UPDATE locations SET is_invisible = ? WHERE path_string LIKE ?",
                params![invisible as i64, path.subtree_pattern()],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to update visibility under {}: {}",
                    path, e
                ))
            })
    }

    /// Set `is_invisible` on the given rows, chunked by the id batch size
    pub async fn set_invisible_by_ids(
        &self,
        ids: &[LocationId],
        invisible: bool,
    ) -> Result<u64, DatabaseError> {
        let mut affected = 0;
        for chunk in ids.chunks(self.id_batch_size) {
            let sql = format!(
                "UPDATE locations SET is_invisible = ? WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut values = vec![Value::from(invisible as i64)];
            values.extend(chunk.iter().map(|id| Value::from(*id)));
            affected += self
                .conn
                .execute(&sql, Params::Positional(values))
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to update visibility: {}", e))
                })?;
        }
        Ok(affected)
    }

    /// Swap support: point a slot at a different content item/version
    pub async fn set_content(
        &self,
        id: LocationId,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute(
                "UPDATE locations SET content_id = ?, content_version = ? WHERE id = ?",
                params![content_id, content_version, id],
            )
            .await?)
    }

    /// Repoint every placement of a content item to a newly published version
    pub async fn update_locations_content_version(
        &self,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute(
                "UPDATE locations SET content_version = ? WHERE content_id = ?",
                params![content_version, content_id],
            )
            .await?)
    }

    pub async fn delete_location(&self, id: LocationId) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute("DELETE FROM locations WHERE id = ?", [id])
            .await?)
    }

    /// Delete the subtree rooted at `path`, returning the removed rows
    pub async fn delete_subtree(
        &self,
        path: &MaterializedPath,
    ) -> Result<Vec<LocationNode>, DatabaseError> {
        let removed = self.find_subtree(path).await?;
        self.conn
            .execute(
                "DELETE FROM locations WHERE path_string LIKE ?",
                [path.subtree_pattern()],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to delete subtree {}: {}", path, e))
            })?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Hidden-state lookups
    // ------------------------------------------------------------------

    /// Hidden nodes (explicitly or via content) inside the subtree at `path`
    pub async fn hidden_ids_in_subtree(
        &self,
        path: &MaterializedPath,
    ) -> Result<Vec<LocationId>, DatabaseError> {
        let sql = format!(
            "SELECT l.id FROM locations l
             LEFT JOIN content_objects c ON c.id = l.content_id
             WHERE l.path_string LIKE ? AND {}
             ORDER BY l.id",
            HIDDEN_CONDITION
        );
        self.query_ids(&sql, [path.subtree_pattern()]).await
    }

    /// Hidden placements (explicitly or via content) of a content item
    pub async fn hidden_ids_of_content(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<LocationId>, DatabaseError> {
        let sql = format!(
            "SELECT l.id FROM locations l
             LEFT JOIN content_objects c ON c.id = l.content_id
             WHERE l.content_id = ? AND {}
             ORDER BY l.id",
            HIDDEN_CONDITION
        );
        self.query_ids(&sql, [content_id]).await
    }

    /// The subset of `ids` that is hidden (explicitly or via content)
    pub async fn hidden_among(
        &self,
        ids: &[LocationId],
    ) -> Result<HashSet<LocationId>, DatabaseError> {
        let mut hidden = HashSet::new();
        for chunk in ids.chunks(self.id_batch_size) {
            let sql = format!(
                "SELECT l.id FROM locations l
                 LEFT JOIN content_objects c ON c.id = l.content_id
                 WHERE l.id IN ({}) AND {}",
                placeholders(chunk.len()),
                HIDDEN_CONDITION
            );
            hidden.extend(self.query_ids(&sql, id_params(chunk)).await?);
        }
        Ok(hidden)
    }

    // ------------------------------------------------------------------
    // Main locations
    // ------------------------------------------------------------------

    pub async fn main_location_id(
        &self,
        content_id: ContentId,
    ) -> Result<Option<LocationId>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT location_id FROM main_locations WHERE content_id = ?",
                [content_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set_main_location(
        &self,
        content_id: ContentId,
        location_id: LocationId,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO main_locations (content_id, location_id) VALUES (?, ?)
                 ON CONFLICT(content_id) DO UPDATE SET location_id = excluded.location_id",
                params![content_id, location_id],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to set main location of content {}: {}",
                    content_id, e
                ))
            })?;
        Ok(())
    }

    pub async fn clear_main_location(&self, content_id: ContentId) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM main_locations WHERE content_id = ?",
                [content_id],
            )
            .await?)
    }

    /// Lowest remaining location id of a content item, skipping `excluding`
    pub async fn lowest_location_id(
        &self,
        content_id: ContentId,
        excluding: LocationId,
    ) -> Result<Option<LocationId>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT MIN(id) FROM locations WHERE content_id = ? AND id != ?",
                params![content_id, excluding],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<i64>>(0)?),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Node assignments
    // ------------------------------------------------------------------

    pub async fn insert_assignment(
        &self,
        new: &NewNodeAssignment,
    ) -> Result<NodeAssignment, DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO node_assignments
                    (content_id, content_version, parent_location_id, is_main, op_code,
                     parent_remote_id, priority, sort_field, sort_order, is_hidden)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    new.content_id,
                    new.content_version,
                    new.parent_location_id,
                    new.is_main as i64,
                    new.op_code.code(),
                    new.parent_remote_id.clone(),
                    new.priority,
                    new.sort_field.code(),
                    new.sort_order.code(),
                    new.is_hidden as i64
                ],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to insert assignment: {}", e))
            })?;

        Ok(NodeAssignment {
            id: self.conn.last_insert_rowid(),
            content_id: new.content_id,
            content_version: new.content_version,
            parent_location_id: new.parent_location_id,
            is_main: new.is_main,
            op_code: new.op_code,
            parent_remote_id: new.parent_remote_id.clone(),
            priority: new.priority,
            sort_field: new.sort_field,
            sort_order: new.sort_order,
            is_hidden: new.is_hidden,
        })
    }

    /// Assignments of a content version in ascending id order
    pub async fn find_assignments(
        &self,
        content_id: ContentId,
        content_version: i64,
    ) -> Result<Vec<NodeAssignment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM node_assignments
             WHERE content_id = ? AND content_version = ?
             ORDER BY id",
            ASSIGNMENT_COLUMNS
        );
        let mut rows = self
            .conn
            .query(&sql, params![content_id, content_version])
            .await?;

        let mut assignments = Vec::new();
        while let Some(row) = rows.next().await? {
            assignments.push(Self::row_to_assignment(&row)?);
        }
        Ok(assignments)
    }

    pub async fn set_assignment_op_code(
        &self,
        id: i64,
        op_code: AssignmentOpCode,
    ) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute(
                "UPDATE node_assignments SET op_code = ? WHERE id = ?",
                params![op_code.code(), id],
            )
            .await?)
    }

    /// Flag as main exactly the assignments of this content version that
    /// target `parent_location_id`
    pub async fn set_assignment_main_flags(
        &self,
        content_id: ContentId,
        content_version: i64,
        parent_location_id: LocationId,
    ) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute(
                "UPDATE node_assignments
                 SET is_main = CASE WHEN parent_location_id = ? THEN 1 ELSE 0 END
                 WHERE content_id = ? AND content_version = ?",
                params![parent_location_id, content_id, content_version],
            )
            .await?)
    }

    /// Delete the assignments of a content item, or of one of its versions
    pub async fn delete_assignments(
        &self,
        content_id: ContentId,
        content_version: Option<i64>,
    ) -> Result<u64, DatabaseError> {
        let affected = match content_version {
            Some(version) => {
                self.conn
                    .execute(
                        "DELETE FROM node_assignments WHERE content_id = ? AND content_version = ?",
                        params![content_id, version],
                    )
                    .await?
            }
            None => {
                self.conn
                    .execute(
                        "DELETE FROM node_assignments WHERE content_id = ?",
                        [content_id],
                    )
                    .await?
            }
        };
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Trash
    // ------------------------------------------------------------------

    pub async fn insert_trash(&self, entry: &TrashEntry) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO trash
                    (location_id, parent_id, content_id, content_version, path_string,
                     path_identification, depth, priority, sort_field, sort_order, remote_id,
                     is_hidden, trashed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    entry.id,
                    nullable(entry.parent_id),
                    entry.content_id,
                    entry.content_version,
                    entry.path.to_string(),
                    entry.path_identification.to_string(),
                    entry.depth,
                    entry.priority,
                    entry.sort_field.code(),
                    entry.sort_order.code(),
                    entry.remote_id.clone(),
                    entry.is_hidden as i64,
                    format_timestamp(&entry.trashed_at)
                ],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to insert trash entry {}: {}",
                    entry.id, e
                ))
            })?;
        Ok(())
    }

    pub async fn get_trash(&self, id: LocationId) -> Result<Option<TrashEntry>, DatabaseError> {
        let sql = format!("SELECT {} FROM trash WHERE location_id = ?", TRASH_COLUMNS);
        let mut rows = self.conn.query(&sql, [id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_trash(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_trash(&self, id: LocationId) -> Result<u64, DatabaseError> {
        Ok(self
            .conn
            .execute("DELETE FROM trash WHERE location_id = ?", [id])
            .await?)
    }

    pub async fn delete_all_trash(&self) -> Result<u64, DatabaseError> {
        Ok(self.conn.execute("DELETE FROM trash", ()).await?)
    }

    /// Count trash entries matching `filter` (a boolean SQL condition)
    pub async fn count_trash(&self, filter: &SqlFragment) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT COUNT(*) FROM trash WHERE {}", condition_sql(filter));
        self.query_count(&sql, Params::Positional(filter.params().to_vec()))
            .await
    }

    /// One page of trash entries matching `filter`, ordered by `order_by`
    pub async fn find_trash(
        &self,
        filter: &SqlFragment,
        order_by: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<TrashEntry>, DatabaseError> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM trash WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            TRASH_COLUMNS,
            condition_sql(filter),
            order_by
        );
        let mut values = filter.params().to_vec();
        values.push(Value::from(limit));
        values.push(Value::from(offset as i64));

        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query trash: {}", e)))?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::row_to_trash(&row)?);
        }
        Ok(entries)
    }
}

/// `?, ?, ?` for an `IN (...)` list
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn id_params(ids: &[i64]) -> Params {
    Params::Positional(ids.iter().map(|id| Value::from(*id)).collect())
}

fn nullable(id: Option<i64>) -> Value {
    id.map(Value::from).unwrap_or(Value::Null)
}

fn condition_sql(filter: &SqlFragment) -> &str {
    if filter.is_empty() {
        "1 = 1"
    } else {
        filter.sql()
    }
}

fn generate_remote_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// Store tests in separate module
#[cfg(test)]
#[path = "tree_store_test.rs"]
mod tree_store_test;
