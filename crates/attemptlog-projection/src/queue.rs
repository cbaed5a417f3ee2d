//! Follow-up message queue: a single pending message per attempt session,
//! backed by a remote slot.
//!
//! Local state only changes after the backend confirms a request. Mutating
//! calls are serialized through an async guard, and every response is checked
//! against the session epoch it was issued for so a late reply can never
//! overwrite a newer session's state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use attemptlog_core::types::{QueueStatus, QueuedMessage};

// ─── Backend Boundary ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no active session")]
    NoSession,

    #[error("queue backend request failed: {0}")]
    Backend(String),
}

/// Remote source of truth for the queue slot.
pub trait QueueBackend: Send + Sync {
    fn queue_status(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<QueueStatus, QueueError>> + Send;

    fn queue_message(
        &self,
        session_id: &str,
        message: &QueuedMessage,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn cancel_queue(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}

// ─── Projection ──────────────────────────────────────────────────────

/// UI-facing snapshot of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueView {
    pub status: QueueStatus,
    pub is_queued: bool,
    pub queued_message: Option<QueuedMessage>,
    pub is_loading: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    session_id: Option<String>,
    /// Bumped on every session change; responses carry the epoch they were issued under.
    epoch: u64,
    status: QueueStatus,
    in_flight: usize,
}

/// Ticket for one request: the session and epoch it belongs to.
#[derive(Debug, Clone)]
struct Ticket {
    session_id: Option<String>,
    epoch: u64,
}

#[derive(Debug)]
pub struct QueueProjection<B> {
    backend: B,
    state: Mutex<QueueState>,
    op_guard: tokio::sync::Mutex<()>,
}

impl<B: QueueBackend> QueueProjection<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(QueueState::default()),
            op_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Point the projection at a new session (or none), discarding local state.
    ///
    /// Synchronous: by the time this returns, responses to requests issued
    /// for the previous session are already stale.
    pub fn set_session(&self, session_id: Option<String>) {
        let mut state = self.lock();
        state.epoch += 1;
        state.session_id = session_id;
        state.status = QueueStatus::Empty;
        state.in_flight = 0;
    }

    /// [`Self::set_session`] followed by a refresh from the backend.
    pub async fn switch_session(&self, session_id: impl Into<String>) -> Result<(), QueueError> {
        self.set_session(Some(session_id.into()));
        self.refresh().await
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Ask the backend to hold `message`; replaces any message already queued.
    pub async fn queue_message(
        &self,
        message: impl Into<String>,
        variant: Option<String>,
    ) -> Result<(), QueueError> {
        let message = QueuedMessage {
            message: message.into(),
            variant,
        };
        self.run(
            |backend, session_id| {
                let message = message.clone();
                async move { backend.queue_message(&session_id, &message).await }
            },
            |state, ()| {
                state.status = QueueStatus::Queued {
                    message: message.clone(),
                }
            },
        )
        .await
    }

    pub async fn cancel_queue(&self) -> Result<(), QueueError> {
        self.run(
            |backend, session_id| async move { backend.cancel_queue(&session_id).await },
            |state, ()| state.status = QueueStatus::Empty,
        )
        .await
    }

    /// Overwrite local state with the backend's authoritative status.
    pub async fn refresh(&self) -> Result<(), QueueError> {
        self.run(
            |backend, session_id| async move { backend.queue_status(&session_id).await },
            |state, status| state.status = status,
        )
        .await
    }

    /// Serialize one backend round-trip and commit its result if the session
    /// is unchanged. Stale responses are dropped silently, failed ones leave
    /// the state untouched and are returned to the caller.
    async fn run<'a, T, Req, Fut, Commit>(
        &'a self,
        request: Req,
        commit: Commit,
    ) -> Result<(), QueueError>
    where
        Req: FnOnce(&'a B, String) -> Fut,
        Fut: Future<Output = Result<T, QueueError>>,
        Commit: FnOnce(&mut QueueState, T),
    {
        let ticket = self.begin();
        let _guard = self.op_guard.lock().await;

        // The session may have moved on while this call waited its turn.
        let Some(session_id) = self.current_session(&ticket) else {
            self.finish(&ticket);
            return if self.is_stale(&ticket) {
                debug!(epoch = ticket.epoch, "dropping queue request for stale session");
                Ok(())
            } else {
                Err(QueueError::NoSession)
            };
        };

        let result = request(&self.backend, session_id).await;

        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            debug!(
                session_id = ?ticket.session_id,
                "discarding queue response for stale session"
            );
            return Ok(());
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        let value = result?;
        commit(&mut *state, value);
        Ok(())
    }

    fn begin(&self) -> Ticket {
        let mut state = self.lock();
        state.in_flight += 1;
        Ticket {
            session_id: state.session_id.clone(),
            epoch: state.epoch,
        }
    }

    fn finish(&self, ticket: &Ticket) {
        let mut state = self.lock();
        if state.epoch == ticket.epoch {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    fn current_session(&self, ticket: &Ticket) -> Option<String> {
        let state = self.lock();
        if state.epoch == ticket.epoch {
            state.session_id.clone()
        } else {
            None
        }
    }

    fn is_stale(&self, ticket: &Ticket) -> bool {
        self.lock().epoch != ticket.epoch
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> QueueStatus {
        self.lock().status.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    pub fn view(&self) -> QueueView {
        let state = self.lock();
        QueueView {
            status: state.status.clone(),
            is_queued: state.status.is_queued(),
            queued_message: state.status.queued_message().cloned(),
            is_loading: state.in_flight > 0,
        }
    }
}

// ─── In-Memory Backend ───────────────────────────────────────────────

/// Backend holding one slot per session in process memory.
///
/// `consume` stands in for the execution backend picking up the queued
/// message when the next process starts.
#[derive(Debug, Default)]
pub struct MemoryQueueBackend {
    slots: Mutex<HashMap<String, QueuedMessage>>,
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pending message for `session_id`, emptying its slot.
    pub fn consume(&self, session_id: &str) -> Option<QueuedMessage> {
        self.slots().remove(session_id)
    }

    /// Place a message directly, as another client of the backend would.
    pub fn put(&self, session_id: &str, message: QueuedMessage) {
        self.slots().insert(session_id.to_owned(), message);
    }

    pub fn peek(&self, session_id: &str) -> Option<QueuedMessage> {
        self.slots().get(session_id).cloned()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, QueuedMessage>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueBackend for MemoryQueueBackend {
    async fn queue_status(&self, session_id: &str) -> Result<QueueStatus, QueueError> {
        Ok(match self.peek(session_id) {
            Some(message) => QueueStatus::Queued { message },
            None => QueueStatus::Empty,
        })
    }

    async fn queue_message(
        &self,
        session_id: &str,
        message: &QueuedMessage,
    ) -> Result<(), QueueError> {
        self.put(session_id, message.clone());
        Ok(())
    }

    async fn cancel_queue(&self, session_id: &str) -> Result<(), QueueError> {
        self.consume(session_id);
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
