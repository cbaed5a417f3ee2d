//! Subscription boundary between execution-process log streams and the feed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use attemptlog_core::types::PatchBatch;

/// Buffered batches per subscriber before `publish` waits.
pub const DEFAULT_CAPACITY: usize = 64;

/// Something that can stream patch batches for an attempt session.
pub trait PatchSource {
    /// Open a stream for `session_id`. Replaces any earlier subscription for
    /// the same session; the old receiver sees its channel close.
    fn subscribe(&self, session_id: &str) -> mpsc::Receiver<PatchBatch>;

    /// Stop streaming `session_id`. Returns false if it was not subscribed.
    fn unsubscribe(&self, session_id: &str) -> bool;
}

// ─── Channel Source ──────────────────────────────────────────────────

/// In-process [`PatchSource`] fed by [`ChannelPatchSource::publish`].
#[derive(Debug)]
pub struct ChannelPatchSource {
    capacity: usize,
    senders: Mutex<HashMap<String, mpsc::Sender<PatchBatch>>>,
}

impl Default for ChannelPatchSource {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChannelPatchSource {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver `batch` to its session's subscriber.
    ///
    /// Returns false if nobody is subscribed or the receiver was dropped;
    /// a dropped receiver also ends the subscription.
    pub async fn publish(&self, batch: PatchBatch) -> bool {
        let Some(tx) = self.senders().get(&batch.session_id).cloned() else {
            debug!(session_id = %batch.session_id, "no subscriber for batch");
            return false;
        };

        let session_id = batch.session_id.clone();
        if tx.send(batch).await.is_err() {
            warn!(%session_id, "subscriber dropped, closing stream");
            let mut senders = self.senders();
            if senders.get(&session_id).is_some_and(|cur| cur.same_channel(&tx)) {
                senders.remove(&session_id);
            }
            return false;
        }
        true
    }

    /// Close every open stream.
    pub fn close_all(&self) {
        self.senders().clear();
    }

    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.senders().contains_key(session_id)
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<String, mpsc::Sender<PatchBatch>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PatchSource for ChannelPatchSource {
    fn subscribe(&self, session_id: &str) -> mpsc::Receiver<PatchBatch> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders().insert(session_id.to_owned(), tx);
        debug!(%session_id, "patch stream opened");
        rx
    }

    fn unsubscribe(&self, session_id: &str) -> bool {
        let removed = self.senders().remove(session_id).is_some();
        if removed {
            debug!(%session_id, "patch stream closed");
        }
        removed
    }
}
