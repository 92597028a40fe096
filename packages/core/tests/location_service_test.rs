//! LocationService Integration Tests
//!
//! Drives the transactional facade end to end against a real database file:
//! tree invariants after each kind of mutation, rollback on failure, and
//! event emission after commit.

#[cfg(test)]
mod location_service_tests {
    use anyhow::Result;
    use arbor_core::db::{
        ContentGateway, ContentRecord, LanguageMaskTable, SortDirection, SqlContentGateway,
        TrashCriterion, TrashQuery, TrashSortClause, TreeEvent,
    };
    use arbor_core::models::{
        AssignmentOpCode, ContentStatus, CreateLocationParams, LocationNode, LocationUpdate,
        NewNodeAssignment, SortField,
    };
    use arbor_core::{LocationService, TreeConfig, TreeError, UnhideOutcome};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{timeout, Duration};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Helper to create a service over a fresh database with a bootstrapped root
    async fn create_test_service() -> Result<(LocationService, LocationNode, TempDir)> {
        init_tracing();
        let temp_dir = TempDir::new()?;
        let config = TreeConfig::with_database_path(temp_dir.path().join("tree.db"));
        let service = LocationService::new(config).await?;
        let root = service.create_root(1, 1).await?;
        Ok((service, root, temp_dir))
    }

    async fn place(
        service: &LocationService,
        parent: &LocationNode,
        content_id: i64,
        segment: &str,
    ) -> Result<LocationNode> {
        let location = service
            .create_location(
                parent.id,
                CreateLocationParams {
                    content_id,
                    content_version: 1,
                    identification_segment: segment.to_string(),
                    ..Default::default()
                },
            )
            .await?;
        Ok(location)
    }

    async fn content_status(
        service: &LocationService,
        content_id: i64,
    ) -> Result<Option<ContentStatus>> {
        let conn = service.database().connect()?;
        Ok(SqlContentGateway::new().status(&conn, content_id).await?)
    }

    /// Every node's path is its parent's path plus its own id
    async fn assert_path_invariant(service: &LocationService, root: &LocationNode) -> Result<()> {
        let nodes = service.load_subtree(root.id).await?;
        let by_id: HashMap<i64, &LocationNode> = nodes.iter().map(|n| (n.id, n)).collect();

        for node in &nodes {
            match node.parent_id {
                None => assert_eq!(node.path.segments(), &[node.id]),
                Some(parent_id) => {
                    let parent = by_id
                        .get(&parent_id)
                        .unwrap_or_else(|| panic!("parent {} of {} missing", parent_id, node.id));
                    assert_eq!(node.path, parent.path.child(node.id));
                    assert_eq!(node.depth, parent.depth + 1);
                }
            }
        }
        Ok(())
    }

    /// Exactly one placement of `content_id` is its own main location
    async fn assert_single_main(service: &LocationService, content_id: i64) -> Result<()> {
        let placements = service.load_locations_by_content(content_id, None).await?;
        if placements.is_empty() {
            return Ok(());
        }
        let mains = placements.iter().filter(|l| l.is_main()).count();
        assert_eq!(mains, 1, "content {} has {} main locations", content_id, mains);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_root_only_once() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;

        assert!(root.is_root());
        assert!(root.is_main());
        assert_eq!(root.depth, 0);
        assert_eq!(service.load_root().await?, Some(root));

        let err = service.create_root(2, 1).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidOperation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_path_invariant_after_mixed_operations() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;

        let media = place(&service, &root, 10, "media").await?;
        let images = place(&service, &media, 11, "images").await?;
        let banner = place(&service, &images, 12, "banner").await?;
        let news = place(&service, &root, 13, "news").await?;
        place(&service, &news, 14, "today").await?;

        assert_eq!(banner.path_identification.to_string(), "media/images/banner");

        service.move_subtree(images.id, news.id).await?;
        service.hide(news.id).await?;
        service.trash(banner.id).await?;
        service.rename_path_segment(news.id, "press").await?;
        service.swap(media.id, news.id).await?;

        assert_path_invariant(&service, &root).await?;

        let moved = service.load_location(images.id).await?;
        assert_eq!(moved.path_identification.to_string(), "press/images");
        assert!(moved.is_invisible);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_round_trip_restores_subtree() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;

        let p = place(&service, &root, 10, "p").await?;
        let q = place(&service, &root, 11, "q").await?;
        let x = place(&service, &p, 12, "x").await?;
        let child = place(&service, &x, 13, "child").await?;
        place(&service, &child, 14, "grandchild").await?;
        place(&service, &x, 15, "sibling").await?;

        let before = service.load_subtree(x.id).await?;

        let outcome = service.move_subtree(x.id, q.id).await?;
        assert_eq!(outcome.old_parent_id, Some(p.id));
        assert_eq!(outcome.affected, 4);

        let moved = service.load_subtree(x.id).await?;
        assert!(moved.iter().all(|n| n.path.contains(q.id) && !n.path.contains(p.id)));

        service.move_subtree(x.id, p.id).await?;
        let after = service.load_subtree(x.id).await?;
        assert_eq!(after, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_rejects_root_and_own_subtree() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let a = place(&service, &root, 10, "a").await?;
        let b = place(&service, &a, 11, "b").await?;

        let err = service.move_subtree(a.id, b.id).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidOperation { .. }));

        let err = service.move_subtree(root.id, a.id).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidOperation { .. }));

        let err = service.move_subtree(a.id, 9999).await.unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(service.load_location(b.id).await?, b);
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_hide_survives_unhide() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let r = place(&service, &root, 10, "r").await?;
        let c = place(&service, &r, 11, "c").await?;

        service.hide(r.id).await?;
        let hidden_r = service.load_location(r.id).await?;
        let hidden_c = service.load_location(c.id).await?;
        assert!(hidden_r.is_hidden && hidden_r.is_invisible);
        assert!(!hidden_c.is_hidden && hidden_c.is_invisible);

        service.hide(c.id).await?;
        let outcome = service.unhide(r.id).await?;
        assert!(matches!(outcome, UnhideOutcome::Unhidden { .. }));

        let r = service.load_location(r.id).await?;
        let c = service.load_location(c.id).await?;
        assert!(!r.is_hidden && !r.is_invisible);
        assert!(c.is_hidden && c.is_invisible);
        Ok(())
    }

    #[tokio::test]
    async fn test_unhide_under_hidden_ancestor_changes_nothing() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let outer = place(&service, &root, 10, "outer").await?;
        let inner = place(&service, &outer, 11, "inner").await?;

        service.hide(inner.id).await?;
        service.hide(outer.id).await?;

        let mut rx = service.subscribe_to_events();
        let outcome = service.unhide(inner.id).await?;
        assert_eq!(outcome, UnhideOutcome::DominatedByAncestor);
        assert!(service.load_location(inner.id).await?.is_hidden);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // Hiding an already hidden subtree is not an error
        service.hide(outer.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_trash_untrash_round_trip() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let folder = place(&service, &root, 10, "folder").await?;
        let target = place(&service, &root, 11, "target").await?;
        let node = service
            .create_location(
                folder.id,
                CreateLocationParams {
                    content_id: 200,
                    content_version: 3,
                    identification_segment: "article".to_string(),
                    ..Default::default()
                },
            )
            .await?;

        let entry = service.trash(node.id).await?;
        assert_eq!(entry.id, node.id);
        assert_eq!(entry.content_version, 3);
        assert!(service.load_location(node.id).await.unwrap_err().is_not_found());
        assert_eq!(service.load_trash_entry(node.id).await?.trashed_at, entry.trashed_at);
        assert_eq!(content_status(&service, 200).await?, Some(ContentStatus::Trashed));

        let restored = service.untrash(node.id, Some(target.id)).await?;
        assert_ne!(restored.id, node.id);
        assert_eq!(restored.parent_id, Some(target.id));
        assert_eq!(restored.content_id, 200);
        assert_eq!(restored.content_version, 3);
        assert_eq!(restored.main_location_id, Some(restored.id));

        assert!(service.load_trash_entry(node.id).await.unwrap_err().is_not_found());
        assert_eq!(content_status(&service, 200).await?, Some(ContentStatus::Published));
        assert_path_invariant(&service, &root).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_is_self_inverse() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let seven = place(&service, &root, 70, "seven").await?;
        let eight = service
            .create_location(
                root.id,
                CreateLocationParams {
                    content_id: 80,
                    content_version: 4,
                    identification_segment: "eight".to_string(),
                    ..Default::default()
                },
            )
            .await?;

        service.swap(seven.id, eight.id).await?;
        let swapped = service.load_location(seven.id).await?;
        assert_eq!(swapped.content_id, 80);
        assert_eq!(swapped.content_version, 4);

        service.swap(seven.id, eight.id).await?;
        assert_eq!(service.load_location(seven.id).await?, seven);
        assert_eq!(service.load_location(eight.id).await?, eight);

        let err = service.swap(seven.id, 9999).await.unwrap_err();
        assert!(matches!(err, TreeError::InvariantViolation(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_recomputes_invisibility_of_hidden_content() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;

        let conn = service.database().connect()?;
        SqlContentGateway::new()
            .save(
                &conn,
                ContentRecord {
                    is_hidden: true,
                    ..ContentRecord::published(10, 1)
                },
            )
            .await?;

        let a = place(&service, &root, 10, "a").await?;
        let a_kid = place(&service, &a, 11, "kid").await?;
        let b = place(&service, &root, 20, "b").await?;
        let b_kid = place(&service, &b, 21, "kid").await?;
        assert!(a.is_invisible && a_kid.is_invisible);
        assert!(!b.is_invisible && !b_kid.is_invisible);

        service.swap(a.id, b.id).await?;
        assert!(!service.load_location(a.id).await?.is_invisible);
        assert!(!service.load_location(a_kid.id).await?.is_invisible);
        assert!(service.load_location(b.id).await?.is_invisible);
        assert!(service.load_location(b_kid.id).await?.is_invisible);

        service.swap(a.id, b.id).await?;
        assert_eq!(service.load_location(a.id).await?, a);
        assert_eq!(service.load_location(a_kid.id).await?, a_kid);
        assert_eq!(service.load_location(b.id).await?, b);
        assert_eq!(service.load_location(b_kid.id).await?, b_kid);
        Ok(())
    }

    #[tokio::test]
    async fn test_subtree_membership() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let five = place(&service, &root, 10, "five").await?;
        let two = place(&service, &five, 11, "two").await?;
        let nine = place(&service, &root, 12, "nine").await?;

        assert_eq!(two.path.segments(), &[root.id, five.id, two.id]);
        assert!(two.path.contains(five.id));
        assert!(!two.path.contains(nine.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_main_location_singularity() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let a = place(&service, &root, 10, "a").await?;
        let b = place(&service, &root, 11, "b").await?;

        let first = place(&service, &a, 200, "doc").await?;
        let second = place(&service, &b, 200, "doc").await?;
        let third = place(&service, &root, 200, "doc").await?;
        let other = place(&service, &b, 300, "other").await?;
        assert_single_main(&service, 200).await?;
        assert_eq!(second.main_location_id, Some(first.id));

        service.trash(first.id).await?;
        assert_single_main(&service, 200).await?;
        assert!(service.load_location(second.id).await?.is_main());

        service.change_main_location(200, third.id, 1, root.id).await?;
        assert_single_main(&service, 200).await?;

        service.swap(third.id, other.id).await?;
        assert_single_main(&service, 200).await?;
        assert_single_main(&service, 300).await?;

        // `other` now shows content 200 and is its only placement left
        let removed = service.remove_subtree(b.id).await?;
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&other.id));
        assert!(service.load_locations_by_content(200, None).await?.is_empty());
        assert_single_main(&service, 300).await?;
        assert_eq!(service.fallback_main_location(300, 0).await?, Some(third.id));
        assert_eq!(service.fallback_main_location(300, third.id).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_location_and_remote_id_lookup() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let node = place(&service, &root, 10, "node").await?;

        let updated = service
            .update_location(
                node.id,
                LocationUpdate {
                    priority: Some(7),
                    remote_id: Some("feed-42".to_string()),
                    sort_field: Some(SortField::Name),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(updated.priority, 7);
        assert_eq!(updated.path, node.path);

        let found = service.load_location_by_remote_id("feed-42").await?;
        assert_eq!(found.id, node.id);

        let err = service.load_location_by_remote_id("missing").await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_content_version_and_children_reads() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let a = place(&service, &root, 10, "a").await?;
        place(&service, &a, 200, "x").await?;
        place(&service, &root, 200, "x").await?;

        assert_eq!(service.update_locations_content_version(200, 5).await?, 2);
        let placements = service.load_locations_by_contents(&[200, 10]).await?;
        assert_eq!(placements.len(), 3);
        assert!(placements
            .iter()
            .filter(|l| l.content_id == 200)
            .all(|l| l.content_version == 5));

        assert_eq!(service.count_children(root.id).await?, 2);
        assert_eq!(service.load_children(a.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_translation_filter_on_content_lookup() -> Result<()> {
        init_tracing();
        let temp_dir = TempDir::new()?;
        let config = TreeConfig::with_database_path(temp_dir.path().join("tree.db"));
        let languages = LanguageMaskTable::new(["eng-GB", "ger-DE"])?;
        let english_bit = languages.bit("eng-GB").unwrap_or_default();
        let service = LocationService::new(config)
            .await?
            .with_translation_filter(Arc::new(languages));
        let root = service.create_root(1, 1).await?;
        place(&service, &root, 50, "english").await?;

        let conn = service.database().connect()?;
        SqlContentGateway::new()
            .save(
                &conn,
                ContentRecord {
                    language_mask: english_bit,
                    ..ContentRecord::published(50, 1)
                },
            )
            .await?;

        let german = vec!["ger-DE".to_string()];
        assert!(service
            .load_locations_by_content(50, Some(&german))
            .await?
            .is_empty());

        let unknown = vec!["pol-PL".to_string()];
        assert_eq!(
            service
                .load_locations_by_content(50, Some(&unknown))
                .await?
                .len(),
            1
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_materialize_assignments() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let a = place(&service, &root, 10, "a").await?;
        let b = place(&service, &root, 11, "b").await?;

        let assignment = service
            .create_assignment(NewNodeAssignment::create(400, 1, a.id, true))
            .await?;
        assert_eq!(assignment.parent_remote_id, a.remote_id);
        service
            .create_assignment(NewNodeAssignment::create(400, 1, b.id, false))
            .await?;

        let drafts = service.load_parent_locations_for_draft(400).await?;
        assert_eq!(drafts.iter().map(|l| l.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        let created = service.materialize_assignments(400, 1).await?;
        assert_eq!(created.len(), 2);
        assert_single_main(&service, 400).await?;
        assert!(service.load_location(created[0].id).await?.is_main());
        assert!(service
            .find_assignments(400, 1)
            .await?
            .iter()
            .all(|a| a.op_code == AssignmentOpCode::CreateNop));

        assert_eq!(service.delete_assignments(400, None).await?, 2);
        assert_path_invariant(&service, &root).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_operation_rolls_back_and_emits_nothing() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let kept = place(&service, &root, 10, "kept").await?;
        let doomed = place(&service, &root, 11, "doomed").await?;

        service
            .create_assignment(NewNodeAssignment::create(400, 1, kept.id, true))
            .await?;
        service
            .create_assignment(NewNodeAssignment::create(400, 1, doomed.id, false))
            .await?;
        service.remove_subtree(doomed.id).await?;

        let mut rx = service.subscribe_to_events();
        let err = service.materialize_assignments(400, 1).await.unwrap_err();
        assert!(err.is_not_found());

        // The first placement was created inside the failed transaction
        assert!(service.load_locations_by_content(400, None).await?.is_empty());
        assert!(service
            .find_assignments(400, 1)
            .await?
            .iter()
            .all(|a| a.op_code == AssignmentOpCode::Create));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_events_emitted_after_commit() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let a = place(&service, &root, 10, "a").await?;
        let b = place(&service, &root, 11, "b").await?;

        let mut rx = service.subscribe_to_events();

        let moved = place(&service, &a, 12, "moved").await?;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert_eq!(
            event,
            TreeEvent::LocationCreated {
                location: moved.clone()
            }
        );

        service.move_subtree(moved.id, b.id).await?;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert_eq!(
            event,
            TreeEvent::SubtreeMoved {
                location_id: moved.id,
                old_parent_id: Some(a.id),
                new_parent_id: b.id,
                affected: 1,
            }
        );

        service.trash(moved.id).await?;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert_eq!(event.event_type(), "location:trashed");

        service.empty_trash().await?;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert_eq!(event, TreeEvent::TrashPurged { count: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn test_trash_listing() -> Result<()> {
        let (service, root, _temp_dir) = create_test_service().await?;
        let folder = place(&service, &root, 10, "folder").await?;
        let a = place(&service, &folder, 200, "a").await?;
        let b = place(&service, &folder, 201, "b").await?;
        let c = place(&service, &root, 202, "c").await?;
        for node in [&a, &b, &c] {
            service.trash(node.id).await?;
        }

        let query = TrashQuery::new(TrashCriterion::ParentLocation(folder.id))
            .sorted_by(TrashSortClause::LocationId(SortDirection::Descending));
        let result = service.find_trash_items(&query).await?;
        assert_eq!(result.total_count, 2);
        assert_eq!(
            result.items.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![b.id, a.id]
        );

        assert_eq!(service.count_trashed(None).await?, 3);
        let inverted = TrashCriterion::DepthBetween { min: 3, max: 1 };
        let err = service.count_trashed(Some(&inverted)).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidOperation { .. }));

        tokio_test::assert_ok!(service.remove_trash_entry(c.id).await);
        tokio_test::assert_err!(service.remove_trash_entry(c.id).await);
        assert_eq!(service.empty_trash().await?, 2);
        assert_eq!(service.count_trashed(None).await?, 0);
        Ok(())
    }
}
