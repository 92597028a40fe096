//! Performance benchmarks for tree operations
//!
//! Run with: `cargo bench -p arbor-core`
//!
//! These benchmarks measure the bulk paths of the engine:
//! - Subtree moves (path rebase of every descendant in one transaction)
//! - Hide/unhide cascades over a large subtree
//! - In-memory path rebasing

use arbor_core::models::{
    CreateLocationParams, IdentificationPath, LocationNode, MaterializedPath,
};
use arbor_core::{LocationService, TreeConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Setup a service with a fresh database and a bootstrapped root
async fn setup_test_service() -> (Arc<LocationService>, LocationNode, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = TreeConfig::with_database_path(temp_dir.path().join("bench.db"));
    let service = Arc::new(LocationService::new(config).await.unwrap());
    let root = service.create_root(1, 1).await.unwrap();
    (service, root, temp_dir)
}

/// Build a subtree of `fanout`^`levels` nodes under `parent`
async fn build_subtree(
    service: &LocationService,
    parent: &LocationNode,
    fanout: usize,
    levels: usize,
) -> usize {
    let mut frontier = vec![parent.id];
    let mut created = 0;
    let mut content_id = 1_000;

    for _ in 0..levels {
        let mut next = Vec::with_capacity(frontier.len() * fanout);
        for parent_id in frontier {
            for i in 0..fanout {
                let node = service
                    .create_location(
                        parent_id,
                        CreateLocationParams {
                            content_id,
                            content_version: 1,
                            identification_segment: format!("n{}", i),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
                content_id += 1;
                created += 1;
                next.push(node.id);
            }
        }
        frontier = next;
    }
    created
}

async fn place(
    service: &LocationService,
    parent_id: i64,
    content_id: i64,
    segment: &str,
) -> LocationNode {
    service
        .create_location(
            parent_id,
            CreateLocationParams {
                content_id,
                content_version: 1,
                identification_segment: segment.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

/// Benchmark moving a ~1100-node subtree between two parents
fn bench_move_subtree(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("move_subtree");
    group.sample_size(10); // Fewer samples for expensive operations

    group.bench_function("1110_nodes", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (service, root, _temp) = setup_test_service().await;
                let left = place(&service, root.id, 10, "left").await;
                let right = place(&service, root.id, 11, "right").await;
                let subject = place(&service, left.id, 12, "subject").await;
                build_subtree(&service, &subject, 10, 3).await;

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let destination = if i % 2 == 0 { right.id } else { left.id };
                    let outcome = service.move_subtree(subject.id, destination).await.unwrap();
                    black_box(outcome);
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

/// Benchmark hide + unhide of a ~1100-node subtree
fn bench_hide_cascade(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("hide_cascade");
    group.sample_size(10);

    group.bench_function("1110_nodes", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (service, root, _temp) = setup_test_service().await;
                let subject = place(&service, root.id, 12, "subject").await;
                build_subtree(&service, &subject, 10, 3).await;

                let start = std::time::Instant::now();
                for _ in 0..iters {
                    black_box(service.hide(subject.id).await.unwrap());
                    black_box(service.unhide(subject.id).await.unwrap());
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

/// Benchmark rebasing 10k decoded paths onto a new prefix
fn bench_path_rebase(c: &mut Criterion) {
    let old_prefix: Vec<i64> = vec![1, 5, 9];
    let new_prefix: Vec<i64> = vec![1, 7, 3, 12];
    let paths: Vec<MaterializedPath> = (0..10_000i64)
        .map(|i| {
            MaterializedPath::from_segments(vec![1, 5, 9, 100 + i % 50, 10_000 + i]).unwrap()
        })
        .collect();
    let identifications: Vec<IdentificationPath> = (0..10_000)
        .map(|i| {
            IdentificationPath::from_segments(vec![
                "media".to_string(),
                "images".to_string(),
                format!("item-{}", i),
            ])
        })
        .collect();
    let old_ident = vec!["media".to_string()];
    let new_ident = vec!["archive".to_string(), "2024".to_string()];

    c.bench_function("rebase_10k_materialized_paths", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(path.rebase(&old_prefix, &new_prefix));
            }
        })
    });

    c.bench_function("rebase_10k_identification_paths", |b| {
        b.iter(|| {
            for path in &identifications {
                black_box(path.rebase(&old_ident, &new_ident));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_move_subtree,
    bench_hide_cascade,
    bench_path_rebase
);
criterion_main!(benches);
