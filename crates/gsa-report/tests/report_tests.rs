//! Report generator integration tests over the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use gsa_common::blackboard::{keys, Blackboard, BlackboardRef, MemoryBlackboard};
use gsa_common::broker::{Broker, BrokerRef, BrokerSettings, MemoryBroker, Queue};
use gsa_common::models::{
    AnalysisResult, ArtifactKind, DatasetResult, JobKind, JobState, ReportJob,
};
use gsa_common::notify::LogNotifier;
use gsa_common::registry::JobRegistry;
use gsa_report::config::ReportConfig;
use gsa_report::ReportGenerator;

struct Harness {
    board: BlackboardRef,
    broker: BrokerRef,
    registry: Arc<JobRegistry>,
    generator: ReportGenerator,
}

fn harness() -> Harness {
    let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
    let broker: BrokerRef = Arc::new(MemoryBroker::new(BrokerSettings::default()));
    let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

    let generator = ReportGenerator::new(
        broker.clone(),
        registry.clone(),
        Arc::new(ReportConfig::default()),
        Arc::new(LogNotifier),
    );

    Harness {
        board,
        broker,
        registry,
        generator,
    }
}

fn analysis_result(pathways: &str) -> AnalysisResult {
    AnalysisResult {
        release: "70".to_string(),
        method_name: "camera".to_string(),
        results: vec![DatasetResult {
            name: "rnaseq".to_string(),
            pathways: pathways.to_string(),
            fold_changes: None,
        }],
        reactome_links: None,
        mappings: vec![],
    }
}

fn good_pathways() -> &'static str {
    "Pathway\tName\tDirection\tFDR\tPValue\nP-0001\tB cell receptor signaling\tup\t0.01\t0.001\n"
}

async fn store_result(harness: &Harness, job_id: &str, result: &AnalysisResult) {
    harness
        .board
        .put(
            &keys::result(job_id),
            &serde_json::to_vec(result).unwrap(),
            None,
        )
        .await
        .unwrap();
}

async fn submit(harness: &Harness, job: ReportJob) {
    harness
        .broker
        .publish(Queue::Report, &serde_json::to_vec(&job).unwrap())
        .await
        .unwrap();
    let delivery = harness.broker.consume(Queue::Report).await.unwrap();
    harness.generator.handle_delivery(delivery).await;
}

#[tokio::test]
async fn test_full_report_is_generated() {
    let harness = harness();
    store_result(&harness, "Analysis00000001", &analysis_result(good_pathways())).await;

    submit(
        &harness,
        ReportJob {
            job_id: "Analysis00000001".to_string(),
            kinds: vec![ArtifactKind::Spreadsheet, ArtifactKind::Pdf],
            user_mail: Some("user@example.org".to_string()),
        },
    )
    .await;

    let status = harness
        .registry
        .get_status(JobKind::Report, "Analysis00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Complete);
    assert_eq!(status.progress, 1.0);
    assert_eq!(status.reports.len(), 2);

    let xlsx = status.reports.iter().find(|r| r.name == "XLSX").unwrap();
    assert!(xlsx.url.ends_with("/0.1/result/Analysis00000001.xlsx"));
    assert_eq!(xlsx.mimetype, "application/vnd.ms-excel");

    // Both artifact blobs exist
    assert!(harness
        .board
        .exists(&keys::report_artifact("Analysis00000001", "XLSX"))
        .await
        .unwrap());
    assert!(harness
        .board
        .exists(&keys::report_artifact("Analysis00000001", "PDF"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_partial_failure_still_completes() {
    let harness = harness();
    // Header-only pathway table: the PDF renderer refuses, the
    // spreadsheet does not
    store_result(
        &harness,
        "Analysis00000002",
        &analysis_result("Pathway\tName\tDirection\tFDR\tPValue\n"),
    )
    .await;

    submit(
        &harness,
        ReportJob {
            job_id: "Analysis00000002".to_string(),
            kinds: vec![ArtifactKind::Spreadsheet, ArtifactKind::Pdf],
            user_mail: None,
        },
    )
    .await;

    let status = harness
        .registry
        .get_status(JobKind::Report, "Analysis00000002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Complete);
    assert_eq!(status.reports.len(), 1);
    assert_eq!(status.reports[0].name, "XLSX");
    assert!(status.description.unwrap().contains("PDF generation failed"));

    assert!(!harness
        .board
        .exists(&keys::report_artifact("Analysis00000002", "PDF"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_missing_result_fails_the_report() {
    let harness = harness();
    submit(
        &harness,
        ReportJob {
            job_id: "Analysis00000003".to_string(),
            kinds: vec![ArtifactKind::Spreadsheet],
            user_mail: None,
        },
    )
    .await;

    let status = harness
        .registry
        .get_status(JobKind::Report, "Analysis00000003")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status
        .description
        .unwrap()
        .contains("Failed to retrieve analysis result"));
}

#[tokio::test]
async fn test_redelivery_is_idempotent_on_artifacts() {
    let harness = harness();
    store_result(&harness, "Analysis00000004", &analysis_result(good_pathways())).await;

    let job = ReportJob {
        job_id: "Analysis00000004".to_string(),
        kinds: vec![ArtifactKind::Spreadsheet, ArtifactKind::Pdf],
        user_mail: None,
    };
    submit(&harness, job.clone()).await;

    let first_xlsx = harness
        .board
        .get(&keys::report_artifact("Analysis00000004", "XLSX"))
        .await
        .unwrap()
        .unwrap();
    let first_pdf = harness
        .board
        .get(&keys::report_artifact("Analysis00000004", "PDF"))
        .await
        .unwrap()
        .unwrap();

    // Redeliver the same message: the terminal status short-circuits and
    // the artifact bytes stay identical
    submit(&harness, job).await;

    assert_eq!(
        harness
            .board
            .get(&keys::report_artifact("Analysis00000004", "XLSX"))
            .await
            .unwrap()
            .unwrap(),
        first_xlsx
    );
    assert_eq!(
        harness
            .board
            .get(&keys::report_artifact("Analysis00000004", "PDF"))
            .await
            .unwrap()
            .unwrap(),
        first_pdf
    );
    assert_eq!(harness.broker.queue_length(Queue::Report).await.unwrap(), 0);
}
