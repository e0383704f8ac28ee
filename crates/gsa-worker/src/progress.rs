//! Per-job progress channel.
//!
//! Kernels report `(fraction, message)` through a cheap synchronous
//! handle; a single drain task writes through to the status record,
//! coalescing bursts and throttling to one blackboard write per
//! configured interval. The last update always gets written.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gsa_common::models::JobKind;
use gsa_common::registry::JobRegistry;

struct ProgressEvent {
    fraction: f64,
    message: String,
}

/// Synchronous handle kernels report progress through.
///
/// Fractions are relative to the handle's own `[from, to]` window so a
/// kernel can count its own work from 0 to 1.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    from: f64,
    to: f64,
}

impl ProgressHandle {
    pub fn update(&self, fraction: f64, message: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        let scaled = self.from + (self.to - self.from) * fraction;
        // The receiver only disappears when the job is already being
        // finalized; updates after that are irrelevant.
        let _ = self.tx.send(ProgressEvent {
            fraction: scaled,
            message: message.to_string(),
        });
    }

    /// A handle mapping `[0, 1]` onto a sub-window of this handle
    pub fn window(&self, from: f64, to: f64) -> ProgressHandle {
        let span = self.to - self.from;
        ProgressHandle {
            tx: self.tx.clone(),
            from: self.from + span * from,
            to: self.from + span * to,
        }
    }
}

/// Start the drain task for one job.
///
/// Dropping every handle closes the channel; await the returned task to
/// make sure the final update reached the blackboard.
pub fn start_progress_channel(
    registry: Arc<JobRegistry>,
    kind: JobKind,
    job_id: String,
    min_interval: Duration,
) -> (ProgressHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let task = tokio::spawn(async move {
        let mut last_write: Option<tokio::time::Instant> = None;

        while let Some(mut event) = rx.recv().await {
            if let Some(last) = last_write {
                let elapsed = last.elapsed();
                if elapsed < min_interval {
                    tokio::time::sleep(min_interval - elapsed).await;
                }
            }
            // Only the newest queued update matters
            while let Ok(newer) = rx.try_recv() {
                event = newer;
            }

            if let Err(err) = registry
                .update_progress(kind, &job_id, event.fraction, &event.message)
                .await
            {
                tracing::warn!(job_id = %job_id, error = %err, "Progress update failed");
            }
            last_write = Some(tokio::time::Instant::now());
        }
    });

    (
        ProgressHandle {
            tx,
            from: 0.0,
            to: 1.0,
        },
        task,
    )
}
