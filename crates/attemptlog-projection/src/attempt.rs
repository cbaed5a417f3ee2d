//! Session-scoped wiring: one attempt's merged feed, pinned todos and queue.
//!
//! Switching attempts tears the previous session down before anything of the
//! new one is applied, so no entry, todo or queue state crosses over.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use attemptlog_core::config::FeedConfig;
use attemptlog_core::types::{PatchBatch, PinnedTodos, UnifiedLogEntry};
use attemptlog_sequence::{EntriesUpdate, IngestReport, SubscriberId, UnifiedLogSequence};

use crate::queue::{QueueBackend, QueueError, QueueProjection, QueueView};
use crate::todos::{TodoMatcher, TodoTracker};

// ─── Feed ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AttemptFeed {
    session_id: Option<String>,
    sequence: UnifiedLogSequence,
    todos: TodoTracker,
}

impl Default for AttemptFeed {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

impl AttemptFeed {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            session_id: None,
            sequence: UnifiedLogSequence::new(config.process_names.clone()),
            todos: TodoTracker::new(TodoMatcher::new(&config.todo)),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Tear down the current session and start accepting batches for `session_id`.
    pub fn switch_session(&mut self, session_id: Option<String>) {
        if self.session_id == session_id {
            return;
        }
        info!(from = ?self.session_id, to = ?session_id, "switching attempt session");
        self.sequence.clear();
        self.todos.reset();
        self.session_id = session_id;
    }

    /// Apply `batch` if it belongs to the active session.
    pub fn apply(&mut self, batch: PatchBatch) -> Option<IngestReport> {
        self.apply_at(batch, Utc::now())
    }

    pub fn apply_at(&mut self, batch: PatchBatch, now: DateTime<Utc>) -> Option<IngestReport> {
        if self.session_id.as_deref() != Some(batch.session_id.as_str()) {
            debug!(
                batch_session = %batch.session_id,
                active = ?self.session_id,
                patches = batch.patches.len(),
                "dropping batch for inactive session"
            );
            return None;
        }

        let report = self
            .sequence
            .ingest_at(batch.patches, batch.mode, batch.loading, now);
        self.todos.fold(&self.sequence, &report);
        Some(report)
    }

    /// Apply batches from an adapter channel until it closes. Returns how many
    /// batches were applied to the active session.
    pub async fn pump(&mut self, rx: &mut mpsc::Receiver<PatchBatch>) -> usize {
        let mut applied = 0;
        while let Some(batch) = rx.recv().await {
            if self.apply(batch).is_some() {
                applied += 1;
            }
        }
        applied
    }

    pub fn entries(&self) -> Arc<[UnifiedLogEntry]> {
        self.sequence.entries()
    }

    pub fn todos(&self) -> PinnedTodos {
        self.todos.pinned()
    }

    pub fn sequence(&self) -> &UnifiedLogSequence {
        &self.sequence
    }

    pub fn subscribe(
        &mut self,
        subscriber: impl FnMut(&EntriesUpdate<'_>) + Send + 'static,
    ) -> SubscriberId {
        self.sequence.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.sequence.unsubscribe(id)
    }
}

// ─── View ────────────────────────────────────────────────────────────

/// Feed and queue for the attempt currently on screen.
#[derive(Debug)]
pub struct AttemptView<B> {
    pub feed: AttemptFeed,
    pub queue: QueueProjection<B>,
}

impl<B: QueueBackend> AttemptView<B> {
    pub fn new(config: &FeedConfig, backend: B) -> Self {
        Self {
            feed: AttemptFeed::new(config),
            queue: QueueProjection::new(backend),
        }
    }

    /// Move both projections to `session_id`, then load its queue state.
    pub async fn switch_session(&mut self, session_id: impl Into<String>) -> Result<(), QueueError> {
        let session_id = session_id.into();
        self.feed.switch_session(Some(session_id.clone()));
        self.queue.switch_session(session_id).await
    }

    pub fn close(&mut self) {
        self.feed.switch_session(None);
        self.queue.set_session(None);
    }

    pub fn queue_view(&self) -> QueueView {
        self.queue.view()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
