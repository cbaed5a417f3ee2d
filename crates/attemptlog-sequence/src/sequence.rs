//! Unified log sequence: merges keyed patches from every execution process of
//! an attempt into one de-duplicated, time-ordered feed.
//!
//! Entries are kept in a `BTreeMap` ordered by `(ts, process_id, patch_key)`,
//! with a side index from `(process_id, patch_key)` to the sort key so that
//! re-delivered patches are dropped in O(1).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use attemptlog_core::config::ProcessNaming;
use attemptlog_core::types::{
    DeliveryMode, KeyedPatch, ProcessStartPayload, UnifiedLogEntry, entry_id, parse_timestamp_ms,
    split_entry_id, to_epoch_ms,
};

// ─── Keys & Reports ──────────────────────────────────────────────────

/// Total order of the merged feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub ts: i64,
    pub process_id: String,
    pub patch_key: String,
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub duplicates_dropped: usize,
    pub rejected: usize,
    /// Existing entries whose `process_name` changed after a PROCESS_START.
    pub renamed: usize,
    /// The batch replaced the whole sequence (`initial` mode).
    pub reset: bool,
    /// Sort keys of the entries this batch inserted, in batch order.
    pub inserted: Vec<SortKey>,
    pub notified: bool,
}

impl IngestReport {
    pub fn changed(&self) -> bool {
        self.reset || self.accepted > 0 || self.renamed > 0
    }
}

/// Payload handed to subscribers after an ingest.
#[derive(Debug)]
pub struct EntriesUpdate<'a> {
    pub entries: &'a Arc<[UnifiedLogEntry]>,
    pub mode: DeliveryMode,
    pub loading: bool,
}

pub type SubscriberId = u64;

type Subscriber = Box<dyn FnMut(&EntriesUpdate<'_>) + Send>;

/// Per-process timestamp state for entries that arrive without one.
#[derive(Debug, Clone, Default)]
struct ProcessClock {
    last_ts: Option<i64>,
    start_ts: Option<i64>,
}

// ─── Sequence ────────────────────────────────────────────────────────

/// Merge engine for one attempt's log feed.
///
/// Single-threaded and synchronous: every mutation happens inside
/// [`Self::ingest_at`] or [`Self::clear`], and subscribers are only called
/// after the merged snapshot is complete.
pub struct UnifiedLogSequence {
    ordered: BTreeMap<SortKey, UnifiedLogEntry>,
    /// `(process_id, patch_key)` -> position in `ordered`.
    index: HashMap<(String, String), SortKey>,
    clocks: HashMap<String, ProcessClock>,
    /// Display names learned from PROCESS_START patches.
    names: HashMap<String, String>,
    naming: ProcessNaming,
    /// Shared snapshot handed to readers; replaced only when content changes.
    snapshot: Arc<[UnifiedLogEntry]>,
    revision: u64,
    /// `loading` flag of the last notification; a fresh feed counts as loaded.
    last_loading: bool,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: SubscriberId,
}

impl fmt::Debug for UnifiedLogSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedLogSequence")
            .field("len", &self.ordered.len())
            .field("processes", &self.clocks.len())
            .field("revision", &self.revision)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Default for UnifiedLogSequence {
    fn default() -> Self {
        Self::new(ProcessNaming::default())
    }
}

impl UnifiedLogSequence {
    pub fn new(naming: ProcessNaming) -> Self {
        Self {
            ordered: BTreeMap::new(),
            index: HashMap::new(),
            clocks: HashMap::new(),
            names: HashMap::new(),
            naming,
            snapshot: Arc::from(Vec::new()),
            revision: 0,
            last_loading: false,
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Apply a fully delivered batch using the wall clock for fallback timestamps.
    pub fn ingest(&mut self, batch: Vec<KeyedPatch>, mode: DeliveryMode) -> IngestReport {
        self.ingest_at(batch, mode, false, Utc::now())
    }

    /// Apply a batch under `mode`.
    ///
    /// 1. `initial` discards every entry and per-process clock first.
    /// 2. Malformed patches are logged and skipped; the rest still apply.
    /// 3. Patches whose `(process_id, patch_key)` is already present are dropped.
    /// 4. New entries are inserted at their sorted position.
    /// 5. Subscribers are notified once, after the snapshot is rebuilt, when
    ///    the content changed or `loading` differs from the last notification.
    pub fn ingest_at(
        &mut self,
        batch: Vec<KeyedPatch>,
        mode: DeliveryMode,
        loading: bool,
        now: DateTime<Utc>,
    ) -> IngestReport {
        let now_ms = to_epoch_ms(now);
        let mut report = IngestReport::default();

        if mode == DeliveryMode::Initial {
            self.clear_state();
            report.reset = true;
        }

        for patch in batch {
            if let Err(err) = patch.validate() {
                warn!(error = %err, patch_key = %patch.patch_key, "dropping malformed patch");
                report.rejected += 1;
                continue;
            }

            let dedup = (patch.execution_process_id.clone(), patch.patch_key.clone());
            if self.index.contains_key(&dedup) {
                report.duplicates_dropped += 1;
                continue;
            }

            let ts = self.resolve_ts(&patch, mode, now_ms);

            if let Some(start) = patch.patch.as_process_start() {
                report.renamed += self.record_process_start(&patch.execution_process_id, start, ts);
            }

            let process_name = self.process_name(&patch.execution_process_id);
            let key = SortKey {
                ts,
                process_id: patch.execution_process_id.clone(),
                patch_key: patch.patch_key.clone(),
            };
            let entry = UnifiedLogEntry {
                id: patch.entry_id(),
                ts,
                process_id: patch.execution_process_id,
                process_name,
                patch_key: patch.patch_key,
                patch: patch.patch,
            };

            self.index.insert(dedup, key.clone());
            self.ordered.insert(key.clone(), entry);
            report.inserted.push(key);
            report.accepted += 1;
        }

        if report.changed() {
            self.rebuild_snapshot();
        }

        if report.changed() || self.last_loading != loading {
            self.notify(mode, loading);
            report.notified = true;
        }

        debug!(
            %mode,
            accepted = report.accepted,
            duplicates = report.duplicates_dropped,
            rejected = report.rejected,
            len = self.ordered.len(),
            "ingested patch batch"
        );

        report
    }

    /// Drop every entry and per-process state (session teardown).
    ///
    /// Subscribers stay registered. If entries were visible they receive an
    /// empty `initial` update flagged as loading.
    pub fn clear(&mut self) {
        let had_entries = !self.ordered.is_empty();
        self.clear_state();
        self.last_loading = false;
        if had_entries {
            self.rebuild_snapshot();
            self.notify(DeliveryMode::Initial, true);
        }
    }

    fn clear_state(&mut self) {
        self.ordered.clear();
        self.index.clear();
        self.clocks.clear();
        self.names.clear();
    }

    /// Explicit `ts` wins, then the payload's own timestamp, then the
    /// per-process fallback clock.
    fn resolve_ts(&mut self, patch: &KeyedPatch, mode: DeliveryMode, now_ms: i64) -> i64 {
        let clock = self
            .clocks
            .entry(patch.execution_process_id.clone())
            .or_default();

        let ts = match patch.ts.or_else(|| patch.patch.payload_timestamp_ms()) {
            Some(ts) => ts,
            None => {
                let next = match clock.last_ts {
                    Some(last) => last.saturating_add(1),
                    None => clock.start_ts.unwrap_or(now_ms),
                };
                // Live output never lands behind the moment it arrived.
                if mode == DeliveryMode::Running {
                    next.max(now_ms)
                } else {
                    next
                }
            }
        };

        clock.last_ts = Some(clock.last_ts.map_or(ts, |last| last.max(ts)));
        ts
    }

    /// Record launch metadata; returns how many existing entries were renamed.
    fn record_process_start(
        &mut self,
        process_id: &str,
        start: &ProcessStartPayload,
        ts: i64,
    ) -> usize {
        let clock = self.clocks.entry(process_id.to_owned()).or_default();
        clock.start_ts = Some(parse_timestamp_ms(&start.started_at).unwrap_or(ts));

        let name = self.naming.name_for(&start.run_reason);
        if self.names.get(process_id) == Some(&name) {
            return 0;
        }
        self.names.insert(process_id.to_owned(), name.clone());

        let mut renamed = 0;
        for entry in self
            .ordered
            .values_mut()
            .filter(|e| e.process_id == process_id)
        {
            if entry.process_name != name {
                entry.process_name.clone_from(&name);
                renamed += 1;
            }
        }
        renamed
    }

    fn process_name(&self, process_id: &str) -> String {
        self.names
            .get(process_id)
            .cloned()
            .unwrap_or_else(|| process_id.to_owned())
    }

    fn rebuild_snapshot(&mut self) {
        self.snapshot = self.ordered.values().cloned().collect();
        self.revision += 1;
    }

    fn notify(&mut self, mode: DeliveryMode, loading: bool) {
        self.last_loading = loading;
        let entries = Arc::clone(&self.snapshot);
        let update = EntriesUpdate {
            entries: &entries,
            mode,
            loading,
        };
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&update);
        }
    }

    // ── Subscribers ──────────────────────────────────────────────────

    pub fn subscribe(
        &mut self,
        subscriber: impl FnMut(&EntriesUpdate<'_>) + Send + 'static,
    ) -> SubscriberId {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current merged feed. The same `Arc` is returned until the content changes.
    pub fn entries(&self) -> Arc<[UnifiedLogEntry]> {
        Arc::clone(&self.snapshot)
    }

    pub fn get(&self, key: &SortKey) -> Option<&UnifiedLogEntry> {
        self.ordered.get(key)
    }

    pub fn find(&self, process_id: &str, patch_key: &str) -> Option<&UnifiedLogEntry> {
        self.index
            .get(&(process_id.to_owned(), patch_key.to_owned()))
            .and_then(|key| self.ordered.get(key))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        split_entry_id(id).is_some_and(|(process_id, patch_key)| {
            self.index
                .contains_key(&(process_id.to_owned(), patch_key.to_owned()))
        })
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Monotonic counter bumped whenever the snapshot is rebuilt.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Display name currently assigned to `process_id`.
    pub fn name_of(&self, process_id: &str) -> String {
        self.process_name(process_id)
    }

    /// Ids of every entry, in feed order.
    pub fn ids(&self) -> Vec<String> {
        self.ordered
            .keys()
            .map(|k| entry_id(&k.process_id, &k.patch_key))
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
