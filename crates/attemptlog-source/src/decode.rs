//! JSONL patch logs: one [`PatchBatch`] per line.
//!
//! Blank lines and lines starting with `#` are ignored. A line that does not
//! decode is skipped with a warning; the rest of the log still loads.

use std::path::Path;

use thiserror::Error;
use tracing::warn;

use attemptlog_core::types::PatchBatch;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: invalid patch batch: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read patch log: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of decoding a whole log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLog {
    pub batches: Vec<PatchBatch>,
    /// Lines that failed to decode.
    pub skipped: usize,
}

impl DecodedLog {
    /// Session of the first batch, used when no session is chosen explicitly.
    pub fn first_session(&self) -> Option<&str> {
        self.batches.first().map(|b| b.session_id.as_str())
    }
}

/// Decode one line. `line_no` is 1-based and only used for error reporting.
pub fn decode_line(line: &str, line_no: usize) -> Result<Option<PatchBatch>, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| DecodeError::Json {
            line: line_no,
            source,
        })
}

pub fn decode_log(input: &str) -> DecodedLog {
    let mut log = DecodedLog::default();
    for (idx, line) in input.lines().enumerate() {
        match decode_line(line, idx + 1) {
            Ok(Some(batch)) => log.batches.push(batch),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "skipping undecodable line");
                log.skipped += 1;
            }
        }
    }
    log
}

pub async fn read_log(path: &Path) -> Result<DecodedLog, DecodeError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(decode_log(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attemptlog_core::types::{Channel, DeliveryMode};

    const LOG: &str = r#"
# attempt a, first load
{"sessionId":"a","mode":"initial","patches":[{"type":"STDOUT","content":"hello","patchKey":"k1","executionProcessId":"p1","ts":1000}]}
not json at all
{"sessionId":"a","mode":"running","loading":true,"patches":[{"type":"NORMALIZED_ENTRY","content":{"entry_type":{"type":"assistant_message"},"content":"hi","timestamp":"2026-02-25T12:00:00Z"},"patchKey":"k2","executionProcessId":"p1"}]}
{"sessionId":"a","mode":"sideways","patches":[]}
"#;

    #[test]
    fn decodes_good_lines_and_counts_bad_ones() {
        let log = decode_log(LOG);

        assert_eq!(log.batches.len(), 2);
        assert_eq!(log.skipped, 2);
        assert_eq!(log.first_session(), Some("a"));

        let first = &log.batches[0];
        assert_eq!(first.mode, DeliveryMode::Initial);
        assert!(!first.loading);
        assert_eq!(first.patches[0].ts, Some(1000));

        let second = &log.batches[1];
        assert!(second.loading);
        assert_eq!(second.patches[0].patch.channel(), Channel::NormalizedEntry);
        assert_eq!(second.patches[0].ts, None);
    }

    #[test]
    fn blank_and_comment_lines_are_not_batches() {
        assert!(decode_line("   ", 1).expect("blank").is_none());
        assert!(decode_line("# note", 2).expect("comment").is_none());
    }

    #[test]
    fn error_carries_line_number() {
        let err = decode_line("{", 7).expect_err("truncated");
        assert!(err.to_string().starts_with("line 7:"));
    }

    #[test]
    fn missing_keys_decode_and_are_left_to_validation() {
        let batch = decode_line(
            r#"{"sessionId":"a","mode":"running","patches":[{"type":"STDERR","content":"oops"}]}"#,
            1,
        )
        .expect("decodes")
        .expect("batch");

        let patch = &batch.patches[0];
        assert!(patch.patch_key.is_empty());
        assert!(patch.validate().is_err());
    }
}
