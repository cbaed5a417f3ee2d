//! Text rendering of merged feed entries for terminal output.

use chrono::{DateTime, SecondsFormat};

use attemptlog_core::types::{Patch, UnifiedLogEntry};

/// Epoch milliseconds as RFC 3339 UTC; out-of-range values print raw.
pub fn format_ts(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

/// First line of `text`, with a marker when more lines follow.
pub fn first_line(text: &str) -> String {
    let mut lines = text.trim_end().lines();
    let first = lines.next().unwrap_or_default();
    if lines.next().is_some() {
        format!("{first} …")
    } else {
        first.to_string()
    }
}

/// One line per entry:
///
/// ```text
/// 2026-02-25T12:00:00.000Z [Coding Agent] STDOUT     compiling attemptlog-core
/// ```
pub fn format_entry(entry: &UnifiedLogEntry) -> String {
    let body = match &entry.patch {
        Patch::Stdout { content } | Patch::Stderr { content } => first_line(content),
        Patch::NormalizedEntry { content } => {
            format!("{}: {}", content.entry_type.kind, first_line(&content.content))
        }
        Patch::ProcessStart { content } => {
            format!("started ({}, {})", content.run_reason, content.status)
        }
    };
    format!(
        "{} [{}] {:<16} {}",
        format_ts(entry.ts),
        entry.process_name,
        entry.channel().as_str(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use attemptlog_core::types::{EntryType, NormalizedEntry, ProcessStartPayload};

    fn entry(patch: Patch) -> UnifiedLogEntry {
        UnifiedLogEntry {
            id: "2:p1:k1".into(),
            ts: 1_772_020_800_000,
            process_id: "p1".into(),
            process_name: "Coding Agent".into(),
            patch_key: "k1".into(),
            patch,
        }
    }

    #[test]
    fn ts_renders_as_utc_millis() {
        assert_eq!(format_ts(1_772_020_800_123), "2026-02-25T12:00:00.123Z");
        assert_eq!(format_ts(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn multiline_text_is_folded() {
        assert_eq!(first_line("one\ntwo\n"), "one …");
        assert_eq!(first_line("only\n"), "only");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn stdout_line() {
        let line = format_entry(&entry(Patch::stdout("hello\n")));
        assert_eq!(
            line,
            "2026-02-25T12:00:00.000Z [Coding Agent] STDOUT           hello"
        );
    }

    #[test]
    fn normalized_and_process_start_bodies() {
        let normalized = format_entry(&entry(Patch::normalized(NormalizedEntry {
            entry_type: EntryType::new("assistant_message"),
            content: "Done.".into(),
            timestamp: None,
            metadata: None,
        })));
        assert!(normalized.ends_with("NORMALIZED_ENTRY assistant_message: Done."));

        let start = format_entry(&entry(Patch::process_start(ProcessStartPayload {
            process_id: "p1".into(),
            run_reason: "codingagent".into(),
            started_at: "2026-02-25T12:00:00Z".into(),
            status: "running".into(),
            action: None,
        })));
        assert!(start.ends_with("PROCESS_START    started (codingagent, running)"));
    }
}
