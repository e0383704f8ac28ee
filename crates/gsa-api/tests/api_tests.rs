//! Integration tests for the API surface, run against the in-memory
//! blackboard and broker.

use std::io::Write as IoWrite;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use gsa_api::catalog::Catalog;
use gsa_api::config::ApiConfig;
use gsa_api::routes::create_router;
use gsa_api::search::SearchIndex;
use gsa_api::ApiState;
use gsa_common::blackboard::{keys, Blackboard, BlackboardRef, MemoryBlackboard};
use gsa_common::broker::{Broker, BrokerRef, BrokerSettings, MemoryBroker, Queue};
use gsa_common::models::{AnalysisJob, JobKind};
use gsa_common::registry::JobRegistry;

struct Harness {
    app: Router,
    board: BlackboardRef,
    broker: BrokerRef,
    registry: Arc<JobRegistry>,
}

fn harness_with(settings: BrokerSettings, max_message_tries: u32) -> Harness {
    let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
    let broker: BrokerRef = Arc::new(MemoryBroker::new(settings));
    let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

    let mut config = ApiConfig::default();
    config.backend.broker = settings;
    config.backend.max_message_tries = max_message_tries;

    let catalog = Arc::new(Catalog::load(None));
    let search = Arc::new(SearchIndex::build(&catalog.examples, None, None));

    let state = ApiState {
        board: board.clone(),
        broker: broker.clone(),
        registry: registry.clone(),
        catalog,
        search,
        config: Arc::new(config),
    };

    Harness {
        app: create_router(state),
        board,
        broker,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(BrokerSettings::default(), 3)
}

fn analysis_body() -> String {
    serde_json::json!({
        "methodName": "Camera",
        "datasets": [
            {
                "name": "rnaseq",
                "type": "rnaseq_counts",
                "data": "\tS1\tS2\tS3\tS4\nCD19\t10\t20\t5\t8\nMITF\t0\t4\t21\t3\nTP53\t2\t7\t9\t1",
                "design": {
                    "samples": ["S1", "S2", "S3", "S4"],
                    "comparison": {"group1": "tumor", "group2": "control"},
                    "analysisGroup": ["tumor", "tumor", "control", "control"]
                }
            },
            {
                "name": "proteomics",
                "type": "proteomics_int",
                "data": "\tP1\tP2\nCD19\t3.5\t4.1\nMITF\t7.2\t1.1",
                "design": {
                    "samples": ["P1", "P2"],
                    "comparison": {"group1": "tumor", "group2": "control"},
                    "analysisGroup": ["tumor", "control"]
                }
            }
        ]
    })
    .to_string()
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_happy_admission_allocates_sequential_ids() {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(post_json("/0.1/analysis", analysis_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Analysis00000001");

    let response = harness
        .app
        .clone()
        .oneshot(post_json("/0.1/analysis", analysis_body()))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "Analysis00000002");

    // Both jobs are queued with a seeded running status
    assert_eq!(harness.broker.queue_length(Queue::Analysis).await.unwrap(), 2);

    let response = harness
        .app
        .clone()
        .oneshot(get("/0.1/status/Analysis00000001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_string(response).await;
    assert!(status.contains("\"running\""));
    assert!(status.contains("Queued"));
}

#[tokio::test]
async fn test_queued_message_carries_the_normalized_input() {
    let harness = harness();
    harness
        .app
        .clone()
        .oneshot(post_json("/0.1/analysis", analysis_body()))
        .await
        .unwrap();

    let delivery = harness.broker.consume(Queue::Analysis).await.unwrap();
    let job: AnalysisJob = serde_json::from_slice(&delivery.payload).unwrap();

    assert_eq!(job.job_id, "Analysis00000001");
    assert_eq!(job.input.analysis_id.as_deref(), Some("Analysis00000001"));
    assert_eq!(job.input.datasets.len(), 2);
    // Defaults were filled in at admission
    assert_eq!(job.input.parameter("max_missing_values"), Some("0.5"));
    assert_eq!(
        job.input.datasets[0].parameter("discrete_norm_function"),
        Some("TMM")
    );
}

#[tokio::test]
async fn test_unknown_method_is_404() {
    let harness = harness();
    let body = analysis_body().replace("Camera", "MagicGSA");

    let response = harness
        .app
        .oneshot(post_json("/0.1/analysis", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_design_sample_mismatch_is_406() {
    let harness = harness();
    // Three design samples against four matrix columns
    let body = analysis_body().replace(
        r#""samples": ["S1", "S2", "S3", "S4"]"#,
        r#""samples": ["S1", "S2", "S3"]"#,
    );
    let body = body.replace(
        r#""analysisGroup": ["tumor", "tumor", "control", "control"]"#,
        r#""analysisGroup": ["tumor", "tumor", "control"]"#,
    );

    let response = harness
        .app
        .oneshot(post_json("/0.1/analysis", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_duplicate_dataset_names_are_406() {
    let harness = harness();
    let body = analysis_body().replace("\"proteomics\"", "\"rnaseq\"");

    let response = harness
        .app
        .oneshot(post_json("/0.1/analysis", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(post_json("/0.1/analysis", "no json here".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gzip_body_admits_like_plain_json() {
    let harness = harness();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(analysis_body().as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/0.1/analysis")
        .header(header::CONTENT_TYPE, "application/gzip")
        .body(Body::from(compressed))
        .unwrap();

    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Analysis00000001");

    // The queued item matches what a plain admission produces
    let delivery = harness.broker.consume(Queue::Analysis).await.unwrap();
    let job: AnalysisJob = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(job.input.method_name, "Camera");
}

#[tokio::test]
async fn test_saturated_queue_returns_503() {
    let harness = harness_with(
        BrokerSettings {
            max_queue_length: 1,
            max_delivery_count: 3,
        },
        1,
    );

    // Fill the queue
    harness.broker.publish(Queue::Analysis, b"{}").await.unwrap();

    let response = harness
        .app
        .oneshot(post_json("/0.1/analysis", analysis_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // The admitted job was marked failed
    let status = harness
        .registry
        .get_status(JobKind::Analysis, "Analysis00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, gsa_common::models::JobState::Failed);
}

#[tokio::test]
async fn test_status_of_unknown_job_is_404() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(get("/0.1/status/Analysis99999999"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_gating() {
    let harness = harness();
    harness
        .app
        .clone()
        .oneshot(post_json("/0.1/analysis", analysis_body()))
        .await
        .unwrap();

    // Still running: 406
    let response = harness
        .app
        .clone()
        .oneshot(get("/0.1/result/Analysis00000001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    // Unknown id: 404
    let response = harness
        .app
        .clone()
        .oneshot(get("/0.1/result/Analysis99999999"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Complete: the blob is served
    harness
        .board
        .put(
            &keys::result("Analysis00000001"),
            br#"{"release":"70","methodName":"camera","results":[]}"#,
            None,
        )
        .await
        .unwrap();
    harness
        .registry
        .complete(JobKind::Analysis, "Analysis00000001", "Analysis done")
        .await
        .unwrap();

    let response = harness
        .app
        .clone()
        .oneshot(get("/0.1/result/Analysis00000001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"release\""));
}

#[tokio::test]
async fn test_result_of_failed_job_is_406() {
    let harness = harness();
    harness
        .app
        .clone()
        .oneshot(post_json("/0.1/analysis", analysis_body()))
        .await
        .unwrap();
    harness
        .registry
        .fail(JobKind::Analysis, "Analysis00000001", "kernel failed")
        .await
        .unwrap();

    let response = harness
        .app
        .oneshot(get("/0.1/result/Analysis00000001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_report_artifact_is_served_by_extension() {
    let harness = harness();
    harness
        .board
        .put(
            &keys::report_artifact("Analysis00000007", "PDF"),
            b"%PDF-1.4 fake",
            None,
        )
        .await
        .unwrap();

    let response = harness
        .app
        .oneshot(get("/0.1/result/Analysis00000007.pdf"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
}

#[tokio::test]
async fn test_method_and_type_catalogs() {
    let harness = harness();

    let response = harness.app.clone().oneshot(get("/0.1/methods")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let methods: serde_json::Value =
        serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(methods.as_array().unwrap().len(), 3);

    let response = harness.app.clone().oneshot(get("/0.1/types")).await.unwrap();
    let types: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(types.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_dataset_load_admission() {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(post_json("/0.1/data/load/EXAMPLE_MEL_RNA", "[]".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Load00000001");

    let response = harness
        .app
        .clone()
        .oneshot(get("/0.1/data/status/Load00000001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Unknown resources are rejected before admission
    let response = harness
        .app
        .clone()
        .oneshot(post_json("/0.1/data/load/bogus", "[]".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = harness
        .app
        .clone()
        .oneshot(get("/0.1/data/summary/dst_unknown00000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_datasource_catalog() {
    let harness = harness();
    let response = harness.app.oneshot(get("/0.1/data/sources")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sources: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(sources.as_array().unwrap().len() >= 2);
}
