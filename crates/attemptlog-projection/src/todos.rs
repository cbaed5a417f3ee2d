//! Pinned todos: the most recent TODO-list snapshot found among the feed's
//! normalized entries.
//!
//! Only the newest snapshot counts; older ones are superseded, never merged.
//! [`project`] is the pure full scan, [`TodoTracker`] the incremental form
//! driven by [`IngestReport`]s.

use serde::Deserialize;
use serde_json::Value;

use attemptlog_core::config::{TodoConfig, TodoRule};
use attemptlog_core::types::{EntryType, NormalizedEntry, PinnedTodos, TodoItem, UnifiedLogEntry};
use attemptlog_sequence::{IngestReport, SortKey, UnifiedLogSequence};

// ─── Matcher ─────────────────────────────────────────────────────────

/// Decides which normalized entries are TODO-list snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoMatcher {
    rules: Vec<TodoRule>,
}

impl Default for TodoMatcher {
    fn default() -> Self {
        Self::new(&TodoConfig::default())
    }
}

impl TodoMatcher {
    pub fn new(config: &TodoConfig) -> Self {
        Self {
            rules: config.rules.clone(),
        }
    }

    /// Todo list carried by `entry`, or `None` if it is not a snapshot.
    ///
    /// The list is read from `entry_type.action_type.todos`, falling back to
    /// `entry_type.todos`. Items that are not `{content, status}` are skipped.
    pub fn extract(&self, entry: &NormalizedEntry) -> Option<Vec<TodoItem>> {
        let entry_type = &entry.entry_type;
        if !self.rules.iter().any(|rule| rule_matches(rule, entry_type)) {
            return None;
        }

        let list = entry_type
            .field("action_type")
            .and_then(|action| action.get("todos"))
            .or_else(|| entry_type.field("todos"))?
            .as_array()?;

        Some(
            list.iter()
                .filter_map(|item| TodoItem::deserialize(item).ok())
                .collect(),
        )
    }
}

fn rule_matches(rule: &TodoRule, entry_type: &EntryType) -> bool {
    if entry_type.kind != rule.entry_type {
        return false;
    }
    match &rule.action_type {
        None => true,
        Some(expected) => {
            entry_type
                .field("action_type")
                .and_then(|action| action.get("action"))
                .and_then(Value::as_str)
                == Some(expected.as_str())
        }
    }
}

// ─── Pure Projection ─────────────────────────────────────────────────

/// Scan `entries` (feed order) newest-first and return the first snapshot.
pub fn project(entries: &[UnifiedLogEntry], matcher: &TodoMatcher) -> PinnedTodos {
    entries
        .iter()
        .rev()
        .find_map(|entry| snapshot_of(entry, matcher))
        .unwrap_or_default()
}

fn snapshot_of(entry: &UnifiedLogEntry, matcher: &TodoMatcher) -> Option<PinnedTodos> {
    let normalized = entry.patch.as_normalized()?;
    let todos = matcher.extract(normalized)?;
    Some(PinnedTodos {
        todos,
        last_updated: Some(
            normalized
                .timestamp
                .clone()
                .unwrap_or_else(|| entry.ts.to_string()),
        ),
    })
}

// ─── Incremental Tracker ─────────────────────────────────────────────

/// Cached pinned-todo state that only looks at newly inserted entries.
#[derive(Debug, Clone, Default)]
pub struct TodoTracker {
    matcher: TodoMatcher,
    current: Option<(SortKey, PinnedTodos)>,
}

impl TodoTracker {
    pub fn new(matcher: TodoMatcher) -> Self {
        Self {
            matcher,
            current: None,
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Fold the entries inserted by one ingest. Returns true if the pinned
    /// snapshot changed.
    ///
    /// A backfilled snapshot only wins if it sorts after the cached one, so
    /// the result always equals [`project`] over the whole sequence.
    pub fn fold(&mut self, sequence: &UnifiedLogSequence, report: &IngestReport) -> bool {
        let mut changed = false;
        if report.reset && self.current.take().is_some() {
            changed = true;
        }

        for key in &report.inserted {
            if self.current.as_ref().is_some_and(|(seen, _)| seen >= key) {
                continue;
            }
            let Some(snapshot) = sequence
                .get(key)
                .and_then(|entry| snapshot_of(entry, &self.matcher))
            else {
                continue;
            };
            self.current = Some((key.clone(), snapshot));
            changed = true;
        }

        changed
    }

    /// Recompute from scratch over the full sequence.
    pub fn rebuild(&mut self, sequence: &UnifiedLogSequence) {
        self.current = sequence.entries().iter().rev().find_map(|entry| {
            snapshot_of(entry, &self.matcher).map(|snapshot| {
                let key = SortKey {
                    ts: entry.ts,
                    process_id: entry.process_id.clone(),
                    patch_key: entry.patch_key.clone(),
                };
                (key, snapshot)
            })
        });
    }

    pub fn pinned(&self) -> PinnedTodos {
        self.current
            .as_ref()
            .map(|(_, snapshot)| snapshot.clone())
            .unwrap_or_default()
    }

    pub fn matcher(&self) -> &TodoMatcher {
        &self.matcher
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
