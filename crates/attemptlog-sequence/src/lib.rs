//! attemptlog-sequence: merge engine that folds keyed patches from many
//! execution processes into one ordered, de-duplicated feed and notifies
//! subscribers when it changes.

pub mod sequence;

pub use attemptlog_core::types;
pub use sequence::{EntriesUpdate, IngestReport, SortKey, SubscriberId, UnifiedLogSequence};
