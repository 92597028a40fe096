//! Shared fixtures for store-backed operation tests

use crate::config::TreeConfig;
use crate::db::{ContentRecord, SqlContentGateway, TreeDatabase, TreeStore};
use crate::models::{LocationNode, NewLocation};
use libsql::Connection;
use tempfile::TempDir;

/// A fresh database with one open connection
///
/// `_temp_dir` must be kept alive for the test duration.
pub(crate) struct Fixture {
    pub db: TreeDatabase,
    pub conn: Connection,
    pub gateway: SqlContentGateway,
    _temp_dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db = TreeDatabase::new(TreeConfig::with_database_path(
            temp_dir.path().join("test.db"),
        ))
        .await
        .unwrap();
        let conn = db.connect_with_timeout().await.unwrap();

        Self {
            db,
            conn,
            gateway: SqlContentGateway::new(),
            _temp_dir: temp_dir,
        }
    }

    pub fn store(&self) -> TreeStore<'_> {
        TreeStore::new(&self.conn)
    }

    pub async fn root(&self) -> LocationNode {
        self.store().insert_root(1, 1, None).await.unwrap()
    }

    /// Visible child of `parent` showing `content_id`
    pub async fn child(
        &self,
        parent: &LocationNode,
        content_id: i64,
        segment: &str,
    ) -> LocationNode {
        let mut new = NewLocation::new(content_id, 1);
        new.identification_segment = segment.to_string();
        new.is_invisible = parent.hides_children();
        if let Some(main_id) = self.store().main_location_id(content_id).await.unwrap() {
            new.main_location = crate::models::MainLocation::Existing(main_id);
        }
        self.store().insert_location(parent, &new).await.unwrap()
    }

    pub async fn reload(&self, location: &LocationNode) -> LocationNode {
        self.store()
            .get_location(location.id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn hide_content(&self, content_id: i64) {
        self.gateway
            .save(
                &self.conn,
                ContentRecord {
                    is_hidden: true,
                    ..ContentRecord::published(content_id, 1)
                },
            )
            .await
            .unwrap();
    }
}
