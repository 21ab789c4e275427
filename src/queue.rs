//! Queue runner: converts the session's queued items one at a time.
//!
//! A run works from a snapshot of the items that are `Queued` when it
//! starts; anything added later waits for the next run. For each job the
//! runner publishes `Converting`, awaits the converter, then publishes
//! `Converted` or `Failed`. Publishing waits for the store to apply the
//! message, so every state is observable in order. One item's failure is
//! recorded on that item and the run moves on.

use tracing::{error, info, warn};

use crate::contract::Converter;
use crate::session::{
    update_channel, ApplyOutcome, BatchReport, SessionStore, StoreMessage, Transition,
    UpdateSender,
};

pub struct QueueRunner<C> {
    converter: C,
}

impl<C> QueueRunner<C>
where
    C: Converter,
{
    pub fn new(converter: C) -> Self {
        Self { converter }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Run one batch against `store`, applying updates as they are
    /// published. Returns once the last queued item has reached a terminal
    /// state.
    pub async fn drive(&self, store: &SessionStore) -> BatchReport {
        let (updates, receiver) = update_channel(1);
        let (report, ()) = tokio::join!(self.run_batch(store, updates), store.consume(receiver));
        report
    }

    /// Process every item queued in `store` at call time, publishing state
    /// changes through `updates`. Dropping `updates` at the end closes the
    /// channel.
    pub async fn run_batch(&self, store: &SessionStore, updates: UpdateSender) -> BatchReport {
        let jobs = store.queued_jobs();
        let mut report = BatchReport {
            queued: jobs.len(),
            ..BatchReport::default()
        };
        if jobs.is_empty() {
            info!("[QUEUE] Nothing queued; batch complete");
            return report;
        }

        info!(queued = jobs.len(), "[QUEUE] Starting batch");
        updates.publish(StoreMessage::BatchStarted).await;

        for (position, job) in jobs.into_iter().enumerate() {
            let id = job.id;
            info!(%id, file = %job.file_name, position, "[QUEUE] Converting item");

            match updates.transition(id, Transition::Converting).await {
                ApplyOutcome::Applied => {}
                outcome => {
                    warn!(%id, ?outcome, "[QUEUE] Item left the session before conversion; skipping");
                    report.discarded += 1;
                    continue;
                }
            }

            let (transition, converted) = match self.converter.convert(job.request).await {
                Ok(output) => {
                    info!(%id, bytes = output.bytes.len(), "[QUEUE] Conversion succeeded");
                    (Transition::Converted(output), true)
                }
                Err(e) => {
                    error!(%id, file = %job.file_name, error = %e, "[QUEUE][ERROR] Conversion failed");
                    (Transition::Failed(e.to_string()), false)
                }
            };

            match updates.transition(id, transition).await {
                ApplyOutcome::Applied if converted => report.converted += 1,
                ApplyOutcome::Applied => report.failed += 1,
                outcome => {
                    warn!(%id, ?outcome, "[QUEUE] Result discarded; item no longer in session");
                    report.discarded += 1;
                }
            }
        }

        updates.publish(StoreMessage::BatchFinished(report)).await;
        match serde_json::to_string(&report) {
            Ok(json) => info!(report = %json, "[QUEUE] Batch complete"),
            Err(e) => error!(error = ?e, "[QUEUE] Failed to serialize batch report"),
        }
        report
    }
}
