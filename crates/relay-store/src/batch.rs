//! C5 — the batch store: multi-issue orchestration state, keyed by UUID,
//! persisted as one whole-file-replace JSON document per batch.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::paths::StoreLayout;

const LOCK_RETRY_ATTEMPTS: u32 = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);

/// A bounded-retry advisory lock on one batch file, cooperating between this
/// engine's own processes (not a cross-host guarantee). Released on drop.
struct BatchFileLock {
    path: std::path::PathBuf,
}

impl BatchFileLock {
    fn acquire(layout: &StoreLayout, id: &Uuid) -> Result<Self> {
        let path = layout.batches_dir().join(format!("{id}.lock"));
        for attempt in 0..LOCK_RETRY_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt + 1 == LOCK_RETRY_ATTEMPTS {
                        return Err(BatchError::LockContention);
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BatchError::LockContention)
    }
}

impl Drop for BatchFileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Completed,
    Timeout,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedItem {
    pub issue: u64,
    pub pr: u64,
    pub started_at: DateTime<Utc>,
    pub merged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub id: Uuid,
    pub owner: String,
    pub repo: String,
    pub status: BatchStatus,
    pub total_count: u64,
    pub completed_count: u64,
    pub queue: Vec<u64>,
    pub current_issue: Option<u64>,
    pub current_pr: Option<u64>,
    pub completed: Vec<CompletedItem>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reset on every `start_next`/`timeout_current` call; bounds one
    /// polling session, not the batch's overall wall-clock age.
    pub poll_deadline: DateTime<Utc>,
}

impl BatchState {
    /// `completedCount + |queue| + (currentIssue present ? 1 : 0) ==
    /// totalCount` must hold after every mutation.
    pub fn invariant_holds(&self) -> bool {
        let in_flight = if self.current_issue.is_some() { 1 } else { 0 };
        self.completed_count + self.queue.len() as u64 + in_flight == self.total_count
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no batch exists with this id")]
    NotFound,
    #[error("batch is not in progress")]
    NotRunning,
    #[error("no issue is currently checked out")]
    NoCurrentIssue,
    #[error("completeCurrent requires a PR number to be set first")]
    NoCurrentPr,
    #[error("queue is empty, nothing to start")]
    QueueEmpty,
    #[error("an issue is already checked out, complete or abandon it first")]
    IssueInFlight,
    #[error("batch invariant violated: completed + queued + in-flight != total")]
    InvariantViolated,
    #[error("could not acquire the batch file lock after {LOCK_RETRY_ATTEMPTS} attempts")]
    LockContention,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;

pub struct BatchStore {
    layout: StoreLayout,
    poll_deadline: chrono::Duration,
    /// Per-batch start timestamp of the in-flight issue. Not part of the
    /// persisted schema — survives only within one process;
    /// a `completeCurrent` after a process restart falls back to `now`.
    start_times: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl BatchStore {
    pub fn new(layout: StoreLayout, poll_deadline_secs: u64) -> Self {
        Self {
            layout,
            poll_deadline: chrono::Duration::seconds(poll_deadline_secs as i64),
            start_times: Mutex::new(HashMap::new()),
        }
    }

    fn path(&self, id: &Uuid) -> std::path::PathBuf {
        self.layout.batch_path(id)
    }

    fn save(&self, state: &BatchState) -> Result<()> {
        if !state.invariant_holds() {
            return Err(BatchError::InvariantViolated);
        }
        let path = self.path(&state.id);
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<BatchState>> {
        match std::fs::read_to_string(self.path(id)) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a new batch over `issue_numbers`, queued in the given order.
    pub fn create(&self, owner: &str, repo: &str, issue_numbers: Vec<u64>) -> Result<BatchState> {
        let now = Utc::now();
        let state = BatchState {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            status: BatchStatus::InProgress,
            total_count: issue_numbers.len() as u64,
            completed_count: 0,
            queue: issue_numbers,
            current_issue: None,
            current_pr: None,
            completed: Vec::new(),
            started_at: now,
            updated_at: now,
            poll_deadline: now + self.poll_deadline,
        };
        self.save(&state)?;
        Ok(state)
    }

    /// Pop the next issue off the queue into `current_issue`, resetting the
    /// poll deadline clock.
    pub fn start_next(&self, id: &Uuid) -> Result<BatchState> {
        let _lock = BatchFileLock::acquire(&self.layout, id)?;
        let mut state = self.get(id)?.ok_or(BatchError::NotFound)?;
        if state.status != BatchStatus::InProgress {
            return Err(BatchError::NotRunning);
        }
        if state.current_issue.is_some() {
            return Err(BatchError::IssueInFlight);
        }
        let next = state.queue.first().copied().ok_or(BatchError::QueueEmpty)?;
        state.queue.remove(0);
        state.current_issue = Some(next);
        state.current_pr = None;
        state.updated_at = Utc::now();
        state.poll_deadline = state.updated_at + self.poll_deadline;
        self.start_times.lock().unwrap().insert(*id, state.updated_at);
        self.save(&state)?;
        Ok(state)
    }

    pub fn set_pr(&self, id: &Uuid, pr_number: u64) -> Result<BatchState> {
        let _lock = BatchFileLock::acquire(&self.layout, id)?;
        let mut state = self.get(id)?.ok_or(BatchError::NotFound)?;
        if state.current_issue.is_none() {
            return Err(BatchError::NoCurrentIssue);
        }
        state.current_pr = Some(pr_number);
        state.updated_at = Utc::now();
        self.save(&state)?;
        Ok(state)
    }

    /// Mark the current issue done: append `(issue, pr, startedAt,
    /// mergedAt)` to the completed list, advance `completed_count`, and
    /// clear `current_issue`/`current_pr`. Auto-completes the batch when the
    /// queue and in-flight slot are both empty.
    pub fn complete_current(&self, id: &Uuid) -> Result<BatchState> {
        let _lock = BatchFileLock::acquire(&self.layout, id)?;
        let mut state = self.get(id)?.ok_or(BatchError::NotFound)?;
        let issue = state.current_issue.take().ok_or(BatchError::NoCurrentIssue)?;
        let pr = state.current_pr.take().ok_or(BatchError::NoCurrentPr)?;
        let now = Utc::now();
        let started_at = self
            .start_times
            .lock()
            .unwrap()
            .remove(id)
            .unwrap_or(now);

        state.completed.push(CompletedItem {
            issue,
            pr,
            started_at,
            merged_at: now,
        });
        state.completed_count += 1;
        state.updated_at = now;
        if state.queue.is_empty() {
            state.status = BatchStatus::Completed;
        }
        self.save(&state)?;
        Ok(state)
    }

    /// Abandon the whole batch. The in-flight issue, if any, is dropped
    /// without being counted as completed or requeued.
    pub fn abandon(&self, id: &Uuid) -> Result<BatchState> {
        let _lock = BatchFileLock::acquire(&self.layout, id)?;
        let mut state = self.get(id)?.ok_or(BatchError::NotFound)?;
        let dropped = if state.current_issue.take().is_some() { 1 } else { 0 };
        state.total_count -= dropped;
        state.current_pr = None;
        state.status = BatchStatus::Abandoned;
        state.updated_at = Utc::now();
        self.start_times.lock().unwrap().remove(id);
        self.save(&state)?;
        Ok(state)
    }

    /// Called when a `batch_continue` poll exceeds its 30-minute deadline:
    /// marks the batch `timeout`, leaving the in-flight issue/PR in place
    /// so a subsequent `batch_continue` call can resume polling it.
    pub fn timeout_current(&self, id: &Uuid) -> Result<BatchState> {
        let _lock = BatchFileLock::acquire(&self.layout, id)?;
        let mut state = self.get(id)?.ok_or(BatchError::NotFound)?;
        state.status = BatchStatus::Timeout;
        state.updated_at = Utc::now();
        self.save(&state)?;
        Ok(state)
    }

    /// Resume a timed-out batch: resets status and the poll deadline clock
    /// without disturbing the current issue/PR.
    pub fn resume(&self, id: &Uuid) -> Result<BatchState> {
        let _lock = BatchFileLock::acquire(&self.layout, id)?;
        let mut state = self.get(id)?.ok_or(BatchError::NotFound)?;
        state.status = BatchStatus::InProgress;
        state.updated_at = Utc::now();
        state.poll_deadline = state.updated_at + self.poll_deadline;
        self.save(&state)?;
        Ok(state)
    }

    pub fn is_past_deadline(&self, state: &BatchState) -> bool {
        Utc::now() > state.poll_deadline
    }

    pub fn delete(&self, id: &Uuid) -> Result<()> {
        self.start_times.lock().unwrap().remove(id);
        match std::fs::remove_file(self.path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BatchStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        (BatchStore::new(layout, 1800), dir)
    }

    #[test]
    fn create_sets_up_invariant_satisfying_state() {
        let (store, _dir) = store();
        let state = store.create("o", "r", vec![1, 2, 3]).unwrap();
        assert_eq!(state.total_count, 3);
        assert!(state.invariant_holds());
    }

    #[test]
    fn start_next_moves_one_item_from_queue_to_current() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2, 3]).unwrap();
        let state = store.start_next(&created.id).unwrap();
        assert_eq!(state.current_issue, Some(1));
        assert_eq!(state.queue, vec![2, 3]);
        assert!(state.invariant_holds());
    }

    #[test]
    fn cannot_start_next_while_one_is_in_flight() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2]).unwrap();
        store.start_next(&created.id).unwrap();
        let err = store.start_next(&created.id).unwrap_err();
        assert!(matches!(err, BatchError::IssueInFlight));
    }

    #[test]
    fn complete_current_requires_pr_set_first() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1]).unwrap();
        store.start_next(&created.id).unwrap();
        let err = store.complete_current(&created.id).unwrap_err();
        assert!(matches!(err, BatchError::NoCurrentPr));
    }

    #[test]
    fn complete_current_appends_completed_item_and_clears_current() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2]).unwrap();
        store.start_next(&created.id).unwrap();
        store.set_pr(&created.id, 101).unwrap();
        let state = store.complete_current(&created.id).unwrap();
        assert_eq!(state.completed_count, 1);
        assert_eq!(state.completed[0].issue, 1);
        assert_eq!(state.completed[0].pr, 101);
        assert!(state.current_issue.is_none());
        assert!(state.invariant_holds());
        assert_eq!(state.status, BatchStatus::InProgress);
    }

    #[test]
    fn completing_the_last_issue_marks_batch_completed() {
        // completing the last queued issue marks the batch completed
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1]).unwrap();
        store.start_next(&created.id).unwrap();
        store.set_pr(&created.id, 101).unwrap();
        let state = store.complete_current(&created.id).unwrap();
        assert_eq!(state.status, BatchStatus::Completed);
        assert_eq!(state.completed_count, 1);
        assert_eq!(state.total_count, 1);
        assert!(state.queue.is_empty());
    }

    #[test]
    fn timeout_then_resume_preserves_current_issue() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2]).unwrap();
        store.start_next(&created.id).unwrap();
        let timed_out = store.timeout_current(&created.id).unwrap();
        assert_eq!(timed_out.status, BatchStatus::Timeout);
        assert_eq!(timed_out.current_issue, Some(1));

        let resumed = store.resume(&created.id).unwrap();
        assert_eq!(resumed.status, BatchStatus::InProgress);
        assert_eq!(resumed.current_issue, Some(1));
    }

    #[test]
    fn abandon_drops_in_flight_issue_without_counting_it_complete() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2, 3]).unwrap();
        store.start_next(&created.id).unwrap();
        let state = store.abandon(&created.id).unwrap();
        assert_eq!(state.status, BatchStatus::Abandoned);
        assert_eq!(state.total_count, 2);
        assert_eq!(state.completed_count, 0);
        assert!(state.invariant_holds());
    }

    #[test]
    fn start_next_fails_with_lock_contention_when_the_batch_file_is_already_locked() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2]).unwrap();
        let held = BatchFileLock::acquire(&store.layout, &created.id).unwrap();
        let err = store.start_next(&created.id).unwrap_err();
        assert!(matches!(err, BatchError::LockContention));
        drop(held);
        store.start_next(&created.id).unwrap();
    }

    #[test]
    fn lock_file_is_released_after_a_mutating_call_completes() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1]).unwrap();
        store.start_next(&created.id).unwrap();
        let lock_path = store.layout.batches_dir().join(format!("{}.lock", created.id));
        assert!(!lock_path.exists());
    }

    #[test]
    fn invariant_holds_across_a_full_run() {
        let (store, _dir) = store();
        let created = store.create("o", "r", vec![1, 2]).unwrap();
        let s1 = store.start_next(&created.id).unwrap();
        assert!(s1.invariant_holds());
        store.set_pr(&created.id, 1).unwrap();
        let s2 = store.complete_current(&created.id).unwrap();
        assert!(s2.invariant_holds());
        let s3 = store.start_next(&created.id).unwrap();
        assert!(s3.invariant_holds());
        store.set_pr(&created.id, 2).unwrap();
        let s4 = store.complete_current(&created.id).unwrap();
        assert!(s4.invariant_holds());
        assert_eq!(s4.status, BatchStatus::Completed);
        assert_eq!(s4.completed.len(), 2);
    }
}
