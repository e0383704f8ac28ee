//! Loader integration tests over the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use gsa_common::blackboard::{keys, Blackboard, BlackboardRef, MemoryBlackboard};
use gsa_common::broker::{Broker, BrokerRef, BrokerSettings, MemoryBroker, Queue};
use gsa_common::models::{DatasetJob, ExternalData, JobKind, JobState, Parameter};
use gsa_common::notify::LogNotifier;
use gsa_common::registry::JobRegistry;
use gsa_datasets::config::LoaderConfig;
use gsa_datasets::DatasetLoader;

struct Harness {
    board: BlackboardRef,
    broker: BrokerRef,
    registry: Arc<JobRegistry>,
    loader: DatasetLoader,
    _example_dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let example_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        example_dir.path().join("EXAMPLE_MEL_RNA.data"),
        "\tS1\tS2\nCD19\t10\t2\nMITF\t3\t8\n",
    )
    .unwrap();
    std::fs::write(
        example_dir.path().join("EXAMPLE_MEL_RNA.summary"),
        serde_json::json!({
            "id": "EXAMPLE_MEL_RNA",
            "title": "Melanoma RNA-seq example",
            "type": "rnaseq_counts",
            "description": "RNA-seq of melanoma induced B cells"
        })
        .to_string(),
    )
    .unwrap();

    let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
    let broker: BrokerRef = Arc::new(MemoryBroker::new(BrokerSettings::default()));
    let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

    let config = LoaderConfig {
        example_directory: example_dir.path().to_path_buf(),
        ..LoaderConfig::default()
    };

    let loader = DatasetLoader::new(
        broker.clone(),
        registry.clone(),
        Arc::new(config),
        Arc::new(LogNotifier),
    );

    Harness {
        board,
        broker,
        registry,
        loader,
        _example_dir: example_dir,
    }
}

async fn submit(harness: &Harness, loading_id: &str, resource_id: &str) {
    harness
        .registry
        .seed(JobKind::Dataset, loading_id, "Queued")
        .await
        .unwrap();
    let job = DatasetJob {
        loading_id: loading_id.to_string(),
        resource_id: resource_id.to_string(),
        parameters: Vec::<Parameter>::new(),
    };
    harness
        .broker
        .publish(Queue::Dataset, &serde_json::to_vec(&job).unwrap())
        .await
        .unwrap();

    let delivery = harness.broker.consume(Queue::Dataset).await.unwrap();
    harness.loader.handle_delivery(delivery).await;
}

#[tokio::test]
async fn test_example_dataset_loads_end_to_end() {
    let harness = harness();
    submit(&harness, "Load00000001", "EXAMPLE_MEL_RNA").await;

    let status = harness
        .registry
        .get_status(JobKind::Dataset, "Load00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Complete);
    assert_eq!(status.progress, 1.0);

    // The produced dataset id is distinct from the loading id
    let dataset_id = status.dataset_id.expect("dataset id must be published");
    assert!(dataset_id.starts_with("dst_"));

    // Summary and data landed under the dataset keys
    let raw = harness
        .board
        .get(&keys::dataset(&dataset_id))
        .await
        .unwrap()
        .unwrap();
    let summary: ExternalData = serde_json::from_slice(&raw).unwrap();
    assert_eq!(summary.id, dataset_id);
    assert_eq!(summary.title, "Melanoma RNA-seq example");
    assert_eq!(summary.sample_ids, vec!["S1", "S2"]);

    let data = harness
        .board
        .get(&keys::dataset_data(&dataset_id))
        .await
        .unwrap()
        .unwrap();
    assert!(String::from_utf8(data).unwrap().contains("CD19"));
}

#[tokio::test]
async fn test_repeated_load_short_circuits_to_the_cached_dataset() {
    let harness = harness();
    submit(&harness, "Load00000001", "EXAMPLE_MEL_RNA").await;

    let first = harness
        .registry
        .get_status(JobKind::Dataset, "Load00000001")
        .await
        .unwrap()
        .unwrap();

    submit(&harness, "Load00000002", "EXAMPLE_MEL_RNA").await;
    let second = harness
        .registry
        .get_status(JobKind::Dataset, "Load00000002")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.state, JobState::Complete);
    assert_eq!(first.dataset_id, second.dataset_id);
}

#[tokio::test]
async fn test_unknown_resource_fails() {
    let harness = harness();
    submit(&harness, "Load00000001", "EXAMPLE_DOES_NOT_EXIST").await;

    let status = harness
        .registry
        .get_status(JobKind::Dataset, "Load00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status
        .description
        .unwrap()
        .contains("Failed to load dataset"));
    assert!(status.dataset_id.is_none());

    // Deterministic failure: no redelivery
    assert_eq!(
        harness.broker.queue_length(Queue::Dataset).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_unresolvable_identifier_fails() {
    let harness = harness();
    submit(&harness, "Load00000001", "GSE100001").await;

    // No GREIN endpoint is configured, so nothing accepts the id
    let status = harness
        .registry
        .get_status(JobKind::Dataset, "Load00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Failed);
}

#[tokio::test]
async fn test_malformed_example_data_fails() {
    let harness = harness();
    std::fs::write(
        harness._example_dir.path().join("EXAMPLE_BROKEN.data"),
        "\tS1\tS2\nCD19\t10\n",
    )
    .unwrap();
    std::fs::write(
        harness._example_dir.path().join("EXAMPLE_BROKEN.summary"),
        serde_json::json!({
            "id": "EXAMPLE_BROKEN",
            "title": "broken",
            "type": "rnaseq_counts"
        })
        .to_string(),
    )
    .unwrap();

    submit(&harness, "Load00000001", "EXAMPLE_BROKEN").await;

    let status = harness
        .registry
        .get_status(JobKind::Dataset, "Load00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Failed);
}
