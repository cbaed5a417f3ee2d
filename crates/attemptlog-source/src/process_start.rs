//! Turns execution-process status changes into PROCESS_START patches.

use std::collections::HashSet;

use tracing::debug;

use attemptlog_core::types::{KeyedPatch, Patch, ProcessStartPayload};

/// Patch key every PROCESS_START patch is emitted under.
pub const PROCESS_START_KEY: &str = "process-start";

const RUNNING: &str = "running";

/// Emits one PROCESS_START patch per process, the first time it is seen running.
#[derive(Debug, Clone, Default)]
pub struct ProcessStartNotifier {
    announced: HashSet<String>,
}

impl ProcessStartNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the latest known state of a process.
    pub fn observe(&mut self, process: &ProcessStartPayload) -> Option<KeyedPatch> {
        if !process.status.eq_ignore_ascii_case(RUNNING) {
            return None;
        }
        if !self.announced.insert(process.process_id.clone()) {
            return None;
        }

        debug!(
            process_id = %process.process_id,
            run_reason = %process.run_reason,
            "process started"
        );
        Some(KeyedPatch::new(
            process.process_id.clone(),
            PROCESS_START_KEY,
            Patch::process_start(process.clone()),
        ))
    }

    pub fn has_announced(&self, process_id: &str) -> bool {
        self.announced.contains(process_id)
    }

    /// Forget every process (session teardown).
    pub fn reset(&mut self) {
        self.announced.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attemptlog_core::types::Channel;

    fn process(id: &str, status: &str) -> ProcessStartPayload {
        ProcessStartPayload {
            process_id: id.into(),
            run_reason: "codingagent".into(),
            started_at: "2026-02-25T12:00:00Z".into(),
            status: status.into(),
            action: None,
        }
    }

    #[test]
    fn emits_once_on_transition_to_running() {
        let mut notifier = ProcessStartNotifier::new();

        assert!(notifier.observe(&process("p1", "pending")).is_none());

        let patch = notifier.observe(&process("p1", "running")).expect("start patch");
        assert_eq!(patch.patch_key, PROCESS_START_KEY);
        assert_eq!(patch.execution_process_id, "p1");
        assert_eq!(patch.patch.channel(), Channel::ProcessStart);
        assert_eq!(
            patch.patch.as_process_start().map(|p| p.run_reason.as_str()),
            Some("codingagent")
        );

        assert!(notifier.observe(&process("p1", "running")).is_none());
        assert!(notifier.observe(&process("p1", "completed")).is_none());
    }

    #[test]
    fn processes_are_tracked_independently() {
        let mut notifier = ProcessStartNotifier::new();
        assert!(notifier.observe(&process("p1", "running")).is_some());
        assert!(notifier.observe(&process("p2", "Running")).is_some());
        assert!(notifier.has_announced("p2"));

        notifier.reset();
        assert!(!notifier.has_announced("p1"));
        assert!(notifier.observe(&process("p1", "running")).is_some());
    }
}
