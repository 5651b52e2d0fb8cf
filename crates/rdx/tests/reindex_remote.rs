//! Remote-source reindexing against a mock HTTP cluster: scroll open,
//! advance, clear, and the transport failure modes.

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rdx::cluster::TypeMapping;
use rdx::{
    ClusterBackend, DocumentStore, MemoryCluster, ReindexCoordinator, ReindexRequest,
    ReindexState, RemoteSourceConfig, RuntimeConfig,
};

fn fast_runtime() -> RuntimeConfig {
    RuntimeConfig {
        batch_size: 100,
        retry_backoff_ms: 1,
        ..RuntimeConfig::default()
    }
}

fn hit(id: &str, msg: &str) -> serde_json::Value {
    json!({
        "_index": "dataset",
        "_type": "item",
        "_id": id,
        "_source": { "msg": msg, "id": id }
    })
}

fn page(scroll_id: &str, hits: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "_scroll_id": scroll_id, "hits": { "hits": hits } })
}

#[tokio::test]
async fn remote_scroll_copies_every_page_and_clears_the_scroll() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dataset/item/_search"))
        .and(query_param("scroll", "5m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "s1",
            vec![hit("1", "test 1"), hit("2", "test 2"), hit("3", "test 3")],
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll": "5m", "scroll_id": "s1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "s2",
            vec![hit("4", "test 4"), hit("5", "test 5")],
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll": "5m", "scroll_id": "s2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("s2", vec![])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll_id": ["s2"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "succeeded": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryCluster::new();
    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("dataset", "dataset2")
                .source_types(&["item"])
                .remote(RemoteSourceConfig::new(&server.uri()))
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.read, 5);
    assert_eq!(handle.counts.written, 5);
    assert_eq!(store.count("dataset2", Some("item")).await.unwrap(), 5);
}

#[tokio::test]
async fn remote_parent_links_survive_into_a_declared_destination() {
    let server = MockServer::start().await;
    // A scroll hit carries `_parent` as a bare id; the declared parent type
    // only exists in the destination mapping.
    let branch = json!({
        "_index": "company",
        "_type": "branch",
        "_id": "1",
        "_source": { "name": "HQ" }
    });
    let employee = json!({
        "_index": "company",
        "_type": "employee",
        "_id": "1_1",
        "_source": { "name": "Taro" },
        "_parent": "1"
    });
    Mock::given(method("POST"))
        .and(path("/company/_search"))
        .and(query_param("scroll", "5m"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page("s1", vec![branch, employee])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll": "5m", "scroll_id": "s1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("s1", vec![])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "succeeded": true })))
        .mount(&server)
        .await;

    let store = MemoryCluster::new();
    store.create_index("company2").await.unwrap();
    store
        .create_mapping("company2", "employee", TypeMapping::with_parent("branch"))
        .await
        .unwrap();

    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("company", "company2")
                .remote(RemoteSourceConfig::new(&server.uri()))
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.written, 2);
    assert_eq!(
        store.parent_of("company2", "employee", "1_1"),
        Some("1".to_string())
    );
    // The parent itself has no link of its own.
    assert_eq!(store.parent_of("company2", "branch", "1"), None);
}

#[tokio::test]
async fn an_unreachable_remote_fails_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dataset/_search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("shard failure"))
        .mount(&server)
        .await;

    let store = MemoryCluster::new();
    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("dataset", "dataset2")
                .remote(RemoteSourceConfig::new(&server.uri()))
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Failed);
    assert_eq!(handle.counts.written, 0);
    assert!(handle.errors[0].contains("remote cluster unreachable"));
}

#[tokio::test]
async fn a_missing_remote_index_is_source_not_found() {
    // No mocks mounted: the mock server answers 404 to everything.
    let server = MockServer::start().await;

    let store = MemoryCluster::new();
    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("missing", "dataset2")
                .remote(RemoteSourceConfig::new(&server.uri()))
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Failed);
    assert!(handle.errors[0].contains("source not found"));
    assert!(handle.errors[0].contains("missing"));
}

#[tokio::test]
async fn an_empty_remote_source_completes_and_still_clears_its_scroll() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dataset/_search"))
        .and(query_param("scroll", "5m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("s0", vec![])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll_id": ["s0"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "succeeded": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryCluster::new();
    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("dataset", "dataset2")
                .remote(RemoteSourceConfig::new(&server.uri()))
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.read, 0);
    assert!(store.index_exists("dataset2").await.unwrap());
}

#[tokio::test]
async fn a_custom_keep_alive_is_sent_on_open_and_advance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dataset/_search"))
        .and(query_param("scroll", "1m"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page("s1", vec![hit("1", "test 1")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll": "1m", "scroll_id": "s1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("s1", vec![])))
        .expect(1)
        .mount(&server)
        .await;

    let mut remote = RemoteSourceConfig::new(&server.uri());
    remote.keep_alive = "1m".to_string();

    let store = MemoryCluster::new();
    let handle = ReindexCoordinator::new(ClusterBackend::Memory(store.clone()), fast_runtime())
        .submit(
            ReindexRequest::new("dataset", "dataset2")
                .remote(remote)
                .wait_for_completion(true),
        )
        .await
        .unwrap();

    assert_eq!(handle.state, ReindexState::Completed);
    assert_eq!(handle.counts.written, 1);
}
