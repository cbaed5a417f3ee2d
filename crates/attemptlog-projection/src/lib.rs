//! attemptlog-projection: read models derived from the merged attempt feed.
//!
//! - [`todos`] pins the newest TODO snapshot.
//! - [`queue`] mirrors the remote follow-up message slot.
//! - [`attempt`] scopes both, plus the feed itself, to one session.

pub mod attempt;
pub mod queue;
pub mod todos;

pub use attempt::{AttemptFeed, AttemptView};
pub use queue::{MemoryQueueBackend, QueueBackend, QueueError, QueueProjection, QueueView};
pub use todos::{TodoMatcher, TodoTracker};
