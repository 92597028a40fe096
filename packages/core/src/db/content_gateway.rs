//! Content Gateway - seam to the content/version store
//!
//! The tree engine does not own content data. It only needs to flip a content
//! item's publication status when its location is trashed or restored, and to
//! know whether a content item is hidden as a whole.
//!
//! Every method receives the connection the caller's transaction runs on, so
//! status changes commit or roll back together with the tree writes.

use crate::db::error::DatabaseError;
use crate::models::{ContentId, ContentStatus};
use async_trait::async_trait;
use libsql::Connection;

/// Operations the tree engine invokes on the content store
#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// Transition a content item to `status`
    async fn set_status(
        &self,
        conn: &Connection,
        content_id: ContentId,
        status: ContentStatus,
    ) -> Result<(), DatabaseError>;

    /// Current status, `None` if the content store has never seen the item
    async fn status(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> Result<Option<ContentStatus>, DatabaseError>;

    /// Whether the content item itself is hidden
    async fn is_hidden(&self, conn: &Connection, content_id: ContentId)
        -> Result<bool, DatabaseError>;
}

/// Content state as stored in `content_objects`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: ContentId,
    pub status: ContentStatus,
    pub current_version: i64,
    pub is_hidden: bool,
    pub language_mask: i64,
}

impl ContentRecord {
    pub fn published(id: ContentId, current_version: i64) -> Self {
        Self {
            id,
            status: ContentStatus::Published,
            current_version,
            is_hidden: false,
            language_mask: 0,
        }
    }
}

/// `ContentGateway` backed by the `content_objects` table of the tree database
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlContentGateway;

impl SqlContentGateway {
    pub fn new() -> Self {
        Self
    }

    /// Insert or replace a content record
    pub async fn save(
        &self,
        conn: &Connection,
        record: ContentRecord,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO content_objects (id, status, current_version, is_hidden, language_mask)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                current_version = excluded.current_version,
                is_hidden = excluded.is_hidden,
                language_mask = excluded.language_mask",
            (
                record.id,
                record.status.code(),
                record.current_version,
                record.is_hidden as i64,
                record.language_mask,
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to save content: {}", e)))?;
        Ok(())
    }

    pub async fn set_hidden(
        &self,
        conn: &Connection,
        content_id: ContentId,
        hidden: bool,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE content_objects SET is_hidden = ? WHERE id = ?",
            (hidden as i64, content_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to update content visibility: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ContentGateway for SqlContentGateway {
    async fn set_status(
        &self,
        conn: &Connection,
        content_id: ContentId,
        status: ContentStatus,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO content_objects (id, status) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status",
            (content_id, status.code()),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to set content status: {}", e))
        })?;
        Ok(())
    }

    async fn status(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> Result<Option<ContentStatus>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT status FROM content_objects WHERE id = ?",
                [content_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let code: i64 = row.get(0)?;
                ContentStatus::try_from(code)
                    .map(Some)
                    .map_err(|e| DatabaseError::invalid_row("content_objects", e))
            }
            None => Ok(None),
        }
    }

    async fn is_hidden(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> Result<bool, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT is_hidden FROM content_objects WHERE id = ?",
                [content_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? != 0),
            None => Ok(false),
        }
    }
}
