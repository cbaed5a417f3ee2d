//! attemptlog-source: where patch batches come from.
//!
//! Streams are keyed by attempt session. [`ChannelPatchSource`] is the
//! in-process implementation; [`decode`] reads recorded JSONL logs and
//! [`ProcessStartNotifier`] synthesizes PROCESS_START patches from process
//! status updates.

pub mod decode;
pub mod process_start;
pub mod source;

pub use decode::{DecodeError, DecodedLog, decode_line, decode_log, read_log};
pub use process_start::{PROCESS_START_KEY, ProcessStartNotifier};
pub use source::{ChannelPatchSource, PatchSource};
