//! In-memory session store: the ordered set of conversion items, the
//! session phase, and the last intake's rejections.
//!
//! The store is the only place item state changes. Status changes arrive as
//! id-keyed [`StoreMessage`]s, either through [`SessionStore::apply`] or via
//! the acknowledged update channel from [`update_channel`]. Every mutation
//! happens under one write lock, so readers never observe a half-applied
//! change. Shells watch [`SessionStore::subscribe`] to know when to re-render.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contract::ConversionRequest;
use crate::intake::{IntakeOutcome, Rejection};
use crate::item::{ConversionItem, ConvertedOutput, ItemStatus, StatusKind};

/// Coarse state of the whole session, as shown by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Loaded,
    Processing,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub total: usize,
    pub queued: usize,
    pub converting: usize,
    pub converted: usize,
    pub failed: usize,
}

impl SessionCounts {
    pub fn can_convert(&self) -> bool {
        self.queued > 0
    }
}

/// Status change for one item.
#[derive(Debug, Clone)]
pub enum Transition {
    Converting,
    Converted(ConvertedOutput),
    Failed(String),
}

/// Summary of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Items that were queued when the batch started.
    pub queued: usize,
    pub converted: usize,
    pub failed: usize,
    /// Results dropped because their item left the store mid-batch.
    pub discarded: usize,
}

#[derive(Debug, Clone)]
pub enum StoreMessage {
    BatchStarted,
    Item { id: Uuid, transition: Transition },
    BatchFinished(BatchReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// No item with that id; it was removed or the session was reset.
    UnknownItem,
    /// The transition would move the item backwards or skip a state.
    InvalidTransition,
    /// The receiving side of the update channel is gone.
    Closed,
}

/// A queued item captured for conversion, detached from the store.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub id: Uuid,
    pub file_name: String,
    pub request: ConversionRequest,
}

struct Inner {
    items: Vec<ConversionItem>,
    phase: SessionPhase,
    rejections: Vec<Rejection>,
}

/// Cheaply cloneable handle to one session's state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                items: Vec::new(),
                phase: SessionPhase::Idle,
                rejections: Vec::new(),
            })),
            revision: Arc::new(revision),
        }
    }

    /// Receiver whose value increases after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Append accepted items and record the rejections of this intake.
    ///
    /// Rejections replace the previous intake's list. When nothing was
    /// accepted the item list is left untouched.
    pub fn ingest(&self, outcome: IntakeOutcome) -> Vec<Uuid> {
        let IntakeOutcome { accepted, rejected } = outcome;
        let ids: Vec<Uuid> = accepted.iter().map(ConversionItem::id).collect();
        {
            let mut inner = self.inner.write();
            inner.rejections = rejected;
            if !accepted.is_empty() {
                inner.items.extend(accepted);
                inner.phase = SessionPhase::Loaded;
            } else if inner.items.is_empty() {
                inner.phase = SessionPhase::Idle;
            }
            info!(
                added = ids.len(),
                rejected = inner.rejections.len(),
                total = inner.items.len(),
                "[STORE] Ingested intake results"
            );
        }
        self.bump();
        ids
    }

    /// Apply one message. This is the single mutation path for item status.
    pub fn apply(&self, message: StoreMessage) -> ApplyOutcome {
        let outcome = {
            let mut inner = self.inner.write();
            match message {
                StoreMessage::BatchStarted => {
                    inner.phase = SessionPhase::Processing;
                    ApplyOutcome::Applied
                }
                StoreMessage::BatchFinished(report) => {
                    debug!(?report, "[STORE] Batch finished");
                    inner.phase = if inner.items.is_empty() {
                        SessionPhase::Idle
                    } else {
                        SessionPhase::Done
                    };
                    ApplyOutcome::Applied
                }
                StoreMessage::Item { id, transition } => {
                    match inner.items.iter_mut().find(|item| item.id == id) {
                        None => ApplyOutcome::UnknownItem,
                        Some(item) => transition_item(item, transition),
                    }
                }
            }
        };
        match outcome {
            ApplyOutcome::Applied => self.bump(),
            ApplyOutcome::UnknownItem => {
                debug!("[STORE] Update for an item no longer in the session was dropped")
            }
            ApplyOutcome::InvalidTransition => warn!("[STORE] Refused out-of-order status update"),
            ApplyOutcome::Closed => {}
        }
        outcome
    }

    /// Remove one item. Returns whether it existed.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let before = inner.items.len();
            inner.items.retain(|item| item.id != id);
            let removed = inner.items.len() != before;
            if inner.items.is_empty() {
                inner.phase = SessionPhase::Idle;
            }
            removed
        };
        if removed {
            info!(%id, "[STORE] Removed item");
            self.bump();
        }
        removed
    }

    /// Discard every item, the phase and the rejection list.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.write();
            inner.items.clear();
            inner.rejections.clear();
            inner.phase = SessionPhase::Idle;
        }
        info!("[STORE] Session reset");
        self.bump();
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.read().phase
    }

    pub fn rejections(&self) -> Vec<Rejection> {
        self.inner.read().rejections.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<ConversionItem> {
        self.inner.read().items.iter().find(|item| item.id == id).cloned()
    }

    /// All items in insertion order.
    pub fn snapshot(&self) -> Vec<ConversionItem> {
        self.inner.read().items.clone()
    }

    /// Items that are `Converted` right now, in insertion order.
    pub fn converted_snapshot(&self) -> Vec<ConversionItem> {
        self.inner
            .read()
            .items
            .iter()
            .filter(|item| item.output_preview().is_some())
            .cloned()
            .collect()
    }

    /// The queued items at this instant, as self-contained jobs.
    pub fn queued_jobs(&self) -> Vec<PendingJob> {
        self.inner
            .read()
            .items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Queued))
            .map(|item| PendingJob {
                id: item.id,
                file_name: item.file_name.clone(),
                request: ConversionRequest {
                    source: item.source.clone(),
                    source_format: item.source_format,
                    width: item.width,
                    height: item.height,
                },
            })
            .collect()
    }

    pub fn counts(&self) -> SessionCounts {
        let inner = self.inner.read();
        let mut counts = SessionCounts {
            total: inner.items.len(),
            ..SessionCounts::default()
        };
        for item in &inner.items {
            match item.status.kind() {
                StatusKind::Queued => counts.queued += 1,
                StatusKind::Converting => counts.converting += 1,
                StatusKind::Converted => counts.converted += 1,
                StatusKind::Error => counts.failed += 1,
            }
        }
        counts
    }

    /// Apply messages from `receiver` until every sender is dropped,
    /// acknowledging each one.
    pub async fn consume(&self, mut receiver: UpdateReceiver) {
        while let Some(envelope) = receiver.rx.recv().await {
            let outcome = self.apply(envelope.message);
            // The publisher may have stopped waiting; nothing to do then.
            let _ = envelope.ack.send(outcome);
        }
        debug!("[STORE] Update channel closed");
    }
}

fn transition_item(item: &mut ConversionItem, transition: Transition) -> ApplyOutcome {
    let allowed = matches!(
        (&item.status, &transition),
        (ItemStatus::Queued, Transition::Converting)
            | (ItemStatus::Converting, Transition::Converted(_))
            | (ItemStatus::Converting, Transition::Failed(_))
    );
    if !allowed {
        return ApplyOutcome::InvalidTransition;
    }
    if let Transition::Converted(output) = &transition {
        if output.format != item.target_format {
            return ApplyOutcome::InvalidTransition;
        }
    }
    item.status = match transition {
        Transition::Converting => ItemStatus::Converting,
        Transition::Converted(output) => ItemStatus::Converted(output),
        Transition::Failed(message) => ItemStatus::Failed(message),
    };
    ApplyOutcome::Applied
}

struct Envelope {
    message: StoreMessage,
    ack: oneshot::Sender<ApplyOutcome>,
}

/// Publishing half of the store's update channel.
#[derive(Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<Envelope>,
}

/// Receiving half; hand it to [`SessionStore::consume`].
pub struct UpdateReceiver {
    rx: mpsc::Receiver<Envelope>,
}

/// A bounded, acknowledged channel into a [`SessionStore`].
pub fn update_channel(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateSender { tx }, UpdateReceiver { rx })
}

impl UpdateSender {
    /// Send `message` and wait until the store has applied it.
    pub async fn publish(&self, message: StoreMessage) -> ApplyOutcome {
        let (ack, applied) = oneshot::channel();
        if self.tx.send(Envelope { message, ack }).await.is_err() {
            return ApplyOutcome::Closed;
        }
        applied.await.unwrap_or(ApplyOutcome::Closed)
    }

    pub async fn transition(&self, id: Uuid, transition: Transition) -> ApplyOutcome {
        self.publish(StoreMessage::Item { id, transition }).await
    }
}
