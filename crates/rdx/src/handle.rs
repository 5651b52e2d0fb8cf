//! Per-request state: the handle callers poll.
//!
//! The coordinator exclusively owns the live handle; everyone else sees
//! cloned snapshots through the reporter. Terminal states are frozen: no
//! count, error, or state mutation lands after `Completed` or `Failed`.

use serde::Serialize;
use uuid::Uuid;

/// Errors recorded on a handle stop growing past this; the failed count keeps
/// the true total.
const MAX_RECORDED_ERRORS: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub read: u64,
    pub written: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexHandle {
    pub id: Uuid,
    pub state: ReindexState,
    pub counts: Counts,
    pub errors: Vec<String>,
}

impl ReindexHandle {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: ReindexState::Running,
            counts: Counts::default(),
            errors: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state != ReindexState::Running
    }

    pub(crate) fn add_read(&mut self, docs: u64) {
        if !self.is_terminal() {
            self.counts.read += docs;
        }
    }

    pub(crate) fn add_written(&mut self, docs: u64) {
        if !self.is_terminal() {
            self.counts.written += docs;
        }
    }

    pub(crate) fn record_failure(&mut self, error: String) {
        if self.is_terminal() {
            return;
        }
        self.counts.failed += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(error);
        }
    }

    /// `Running -> Completed`. A no-op from any terminal state.
    pub(crate) fn complete(&mut self) {
        if self.state == ReindexState::Running {
            self.state = ReindexState::Completed;
        }
    }

    /// `Running -> Failed`, recording the terminal error. A no-op from any
    /// terminal state.
    pub(crate) fn fail(&mut self, error: String) {
        if self.state == ReindexState::Running {
            self.errors.push(error);
            self.state = ReindexState::Failed;
        }
    }
}
