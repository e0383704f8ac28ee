//! Result notification mails.
//!
//! Builds the user-facing message listing artifact and visualization
//! links; delivery goes through the shared notifier capability. A
//! delivery failure never demotes a report that produced artifacts.

use gsa_common::models::{ReportArtifact, VisualizationLink};
use gsa_common::notify::{Notification, Notifier};

/// Compose the result notification for one completed analysis
pub fn result_notification(
    recipient: &str,
    job_id: &str,
    artifacts: &[ReportArtifact],
    visualizations: &[VisualizationLink],
) -> Notification {
    let mut body = String::from(
        "Dear user,\n\n\
         your analysis request to the Gene Set Analysis service is complete.\n\n\
         You can download your results here:\n\n",
    );

    for link in visualizations {
        body.push_str(&format!("  * {} (visualization): {}\n", link.name, link.url));
    }
    for artifact in artifacts {
        body.push_str(&format!("  * {}: {}\n", artifact.name, artifact.url));
    }
    body.push_str("\nKind regards,\nThe GSA service\n");

    Notification {
        recipient: recipient.to_string(),
        subject: format!("Analysis {} complete", job_id),
        body,
    }
}

/// Send the notification; failures are logged and swallowed
pub async fn send_result_notification(
    notifier: &dyn Notifier,
    recipient: &str,
    job_id: &str,
    artifacts: &[ReportArtifact],
    visualizations: &[VisualizationLink],
) -> bool {
    if artifacts.is_empty() {
        tracing::warn!(job_id, "Not sending a notification, no reports were generated");
        return false;
    }

    let notification = result_notification(recipient, job_id, artifacts, visualizations);
    match notifier.send(&notification).await {
        Ok(()) => {
            tracing::info!(job_id, recipient, "Result notification sent");
            true
        }
        Err(err) => {
            tracing::error!(job_id, error = %err, "Failed to send result notification");
            false
        }
    }
}
