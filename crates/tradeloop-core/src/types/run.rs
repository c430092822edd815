//! Per-invocation run results: observability counters, never authoritative.

use serde::{Deserialize, Serialize};

/// Maximum diagnostic notes kept per run.
pub const MAX_RUN_NOTES: usize = 10;

/// Structured result returned by every engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// True for every expected condition, including "nothing to do",
    /// "already running" and "market closed". False only for fatal aborts.
    pub ok: bool,
    pub run: &'static str,
    pub processed: usize,
    pub scored: usize,
    pub errored: usize,
    pub timed_out: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub closed: usize,
    pub synced: usize,
    pub backfilled: usize,
    pub released: usize,
    /// Diagnostic sample, capped at [`MAX_RUN_NOTES`].
    pub notes: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunResult {
    pub fn new(run: &'static str) -> Self {
        Self {
            ok: true,
            run,
            processed: 0,
            scored: 0,
            errored: 0,
            timed_out: 0,
            submitted: 0,
            skipped: 0,
            closed: 0,
            synced: 0,
            backfilled: 0,
            released: 0,
            notes: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Append a diagnostic note, silently dropping past the cap.
    pub fn note(&mut self, note: impl Into<String>) {
        if self.notes.len() < MAX_RUN_NOTES {
            self.notes.push(note.into());
        }
    }

    pub fn fail(mut self, note: impl Into<String>) -> Self {
        self.ok = false;
        self.note(note);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_capped() {
        let mut result = RunResult::new("test");
        for i in 0..25 {
            result.note(format!("note {i}"));
        }
        assert_eq!(result.notes.len(), MAX_RUN_NOTES);
    }
}
