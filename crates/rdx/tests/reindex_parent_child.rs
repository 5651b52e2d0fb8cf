//! Parent-child reindexing: links and routing survive the copy when the
//! destination declares the relationship, and degrade to plain documents
//! when it does not.

use rdx::cluster::TypeMapping;
use rdx::{
    ClusterBackend, DocumentStore, MemoryCluster, ReindexCoordinator, ReindexRequest,
    ReindexState, RuntimeConfig,
};

fn fast_runtime() -> RuntimeConfig {
    RuntimeConfig {
        batch_size: 100,
        retry_backoff_ms: 1,
        ..RuntimeConfig::default()
    }
}

/// 100 branches with 10 employees each; exactly five branches (1..=5) employ
/// someone aged 20.
async fn seed_company(store: &MemoryCluster, index: &str) {
    store.create_index(index).await.unwrap();
    store
        .create_mapping(index, "employee", TypeMapping::with_parent("branch"))
        .await
        .unwrap();
    for b in 1..=100 {
        store
            .insert(
                index,
                "branch",
                &b.to_string(),
                &format!(r#"{{"name":"branch {b}"}}"#),
                None,
            )
            .await
            .unwrap();
        for e in 1..=10 {
            let age = if b <= 5 && e == 1 { "20" } else { "30" };
            store
                .insert(
                    index,
                    "employee",
                    &format!("{b}_{e}"),
                    &format!(r#"{{"name":"employee {b}_{e}","age":"{age}"}}"#),
                    Some(&b.to_string()),
                )
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn parent_links_survive_when_the_destination_declares_them() {
    let store = MemoryCluster::new();
    seed_company(&store, "company").await;
    assert_eq!(store.has_child_count("company", "employee", "age", "20"), 5);

    // Destination prepared with the same parent declaration.
    store.create_index("company2").await.unwrap();
    store
        .create_mapping("company2", "employee", TypeMapping::with_parent("branch"))
        .await
        .unwrap();

    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(ReindexRequest::new("company", "company2").wait_for_completion(true))
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.read, 1100);
    assert_eq!(handle.counts.written, 1100);
    assert_eq!(store.count("company2", Some("branch")).await.unwrap(), 100);
    assert_eq!(store.count("company2", Some("employee")).await.unwrap(), 1000);

    // Same parent-child answers on both sides of the copy.
    assert_eq!(store.has_child_count("company2", "employee", "age", "20"), 5);
    assert_eq!(
        store.parent_of("company2", "employee", "1_1").as_deref(),
        Some("1")
    );
    assert_eq!(store.parent_of("company2", "branch", "1"), None);
}

#[tokio::test]
async fn links_are_dropped_when_the_destination_lacks_the_declaration() {
    let store = MemoryCluster::new();
    seed_company(&store, "company").await;

    // Destination created without any employee mapping.
    store.create_index("flat").await.unwrap();

    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(ReindexRequest::new("company", "flat").wait_for_completion(true))
        .await
        .unwrap();

    // Every document still lands; only the links degrade.
    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.written, 1100);
    assert_eq!(store.count("flat", Some("employee")).await.unwrap(), 1000);
    assert_eq!(store.parent_of("flat", "employee", "1_1"), None);
    assert_eq!(store.has_child_count("flat", "employee", "age", "20"), 0);
}

#[tokio::test]
async fn a_single_type_copy_keeps_only_that_type() {
    let store = MemoryCluster::new();
    seed_company(&store, "company").await;
    store.create_index("branches").await.unwrap();

    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("company", "branches")
                .source_types(&["branch"])
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.written, 100);
    assert_eq!(store.count("branches", None).await.unwrap(), 100);
}
