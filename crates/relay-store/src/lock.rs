//! C3 — the lock store: per-issue atomic claim files with liveness and
//! staleness checks.
//!
//! One exclusive-create file per `(owner, repo, issue)` triple via
//! `O_CREAT | O_EXCL`, so acquisition races resolve to exactly one winner.

use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::liveness::ProcessProbe;
use crate::paths::{parse_lock_file_name, StoreLayout};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub pid: u32,
    pub session_id: String,
    pub acquired_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("issue is locked and not stale")]
    Held,
    #[error("caller does not hold this lock")]
    NotHeld,
    #[error("filesystem refused lock creation: {0}")]
    CreationFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;

#[derive(Debug, Clone)]
pub struct LockKey {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
}

pub struct LockStore {
    layout: StoreLayout,
    stale_timeout: Duration,
    probe: Box<dyn ProcessProbe>,
}

impl LockStore {
    pub fn new(layout: StoreLayout, stale_timeout: Duration, probe: Box<dyn ProcessProbe>) -> Self {
        Self {
            layout,
            stale_timeout,
            probe,
        }
    }

    fn is_stale(&self, lock: &Lock, now: DateTime<Utc>) -> bool {
        let age = now - lock.acquired_at;
        age > chrono::Duration::from_std(self.stale_timeout).unwrap_or(chrono::Duration::zero())
            || !self.probe.is_alive(lock.pid)
    }

    /// Acquire a lock for `key` on behalf of `session_id`/`pid`. Follows the
    /// three-step protocol: read-and-check-stale,
    /// delete-if-stale, exclusive-create.
    pub fn acquire(&self, key: &LockKey, session_id: &str, pid: u32) -> Result<Lock> {
        let path = self.layout.lock_path(&key.owner, &key.repo, key.issue_number);
        let now = Utc::now();

        if let Some(existing) = self.read(key)? {
            if self.is_stale(&existing, now) {
                let _ = std::fs::remove_file(&path);
            } else {
                return Err(LockError::Held);
            }
        }

        let lock = Lock {
            owner: key.owner.clone(),
            repo: key.repo.clone(),
            issue_number: key.issue_number,
            pid,
            session_id: session_id.to_string(),
            acquired_at: now,
            last_updated_at: now,
        };

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let json = serde_json::to_string_pretty(&lock)?;
                file.write_all(json.as_bytes())?;
                file.sync_all()?;
                Ok(lock)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(LockError::Held),
            Err(e) => Err(LockError::CreationFailed(e.to_string())),
        }
    }

    /// Read the lock at `key`, if any. `None` if absent or unparseable.
    pub fn read(&self, key: &LockKey) -> Result<Option<Lock>> {
        let path = self.layout.lock_path(&key.owner, &key.repo, key.issue_number);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock at `key` if `session_id` holds it. Delete-on-absent
    /// is a no-op success.
    pub fn release(&self, key: &LockKey, session_id: &str) -> Result<()> {
        let path = self.layout.lock_path(&key.owner, &key.repo, key.issue_number);
        match self.read(key)? {
            None => Ok(()),
            Some(lock) if lock.session_id == session_id => {
                std::fs::remove_file(&path)?;
                Ok(())
            }
            Some(_) => Err(LockError::NotHeld),
        }
    }

    /// Overwrite any existing lock unconditionally, retaining the previous
    /// record for audit surfacing.
    pub fn force_claim(&self, key: &LockKey, session_id: &str, pid: u32) -> Result<(Lock, Option<Lock>)> {
        let path = self.layout.lock_path(&key.owner, &key.repo, key.issue_number);
        let previous = self.read(key)?;

        let now = Utc::now();
        let lock = Lock {
            owner: key.owner.clone(),
            repo: key.repo.clone(),
            issue_number: key.issue_number,
            pid,
            session_id: session_id.to_string(),
            acquired_at: now,
            last_updated_at: now,
        };

        let json = serde_json::to_string_pretty(&lock)?;
        std::fs::write(&path, json)?;
        Ok((lock, previous))
    }

    pub fn is_locked(&self, key: &LockKey) -> Result<bool> {
        match self.read(key)? {
            Some(lock) => Ok(!self.is_stale(&lock, Utc::now())),
            None => Ok(false),
        }
    }

    /// List every lock file in the store, each paired with its staleness
    /// flag.
    pub fn list(&self) -> Result<Vec<(Lock, bool)>> {
        let dir = self.layout.locks_dir();
        let mut out = Vec::new();
        if !dir.exists() {
            return Ok(out);
        }

        let now = Utc::now();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            if parse_lock_file_name(name).is_none() {
                continue;
            }
            let text = match std::fs::read_to_string(entry.path()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let Ok(lock): std::result::Result<Lock, _> = serde_json::from_str(&text) else {
                continue;
            };
            let stale = self.is_stale(&lock, now);
            out.push((lock, stale));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::FakeProbe;

    fn store_with(probe: FakeProbe, stale_timeout: Duration) -> (LockStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        (LockStore::new(layout, stale_timeout, Box::new(probe)), dir)
    }

    fn key() -> LockKey {
        LockKey {
            owner: "acme".into(),
            repo: "widgets".into(),
            issue_number: 42,
        }
    }

    #[test]
    fn acquire_then_release_then_acquire_both_succeed_with_fresh_timestamp() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_secs(1800));
        let first = store.acquire(&key(), "session-a", 1).unwrap();
        store.release(&key(), "session-a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.acquire(&key(), "session-a", 1).unwrap();
        assert!(second.acquired_at >= first.acquired_at);
    }

    #[test]
    fn second_acquire_on_held_lock_fails() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_secs(1800));
        store.acquire(&key(), "session-a", 1).unwrap();
        let err = store.acquire(&key(), "session-b", 2).unwrap_err();
        assert!(matches!(err, LockError::Held));
    }

    #[test]
    fn stale_lock_via_dead_pid_is_displaced() {
        let (store, _dir) = store_with(FakeProbe::new(), Duration::from_secs(1800));
        store.acquire(&key(), "session-a", 999).unwrap();
        // PID 999 is not marked alive in the fake probe -> stale immediately.
        let acquired = store.acquire(&key(), "session-b", 2).unwrap();
        assert_eq!(acquired.session_id, "session-b");
    }

    #[test]
    fn stale_lock_via_age_is_displaced() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_millis(1));
        let lock = store.acquire(&key(), "session-a", 1).unwrap();
        assert_eq!(lock.session_id, "session-a");
        std::thread::sleep(std::time::Duration::from_millis(10));
        let acquired = store.acquire(&key(), "session-b", 1).unwrap();
        assert_eq!(acquired.session_id, "session-b");
    }

    #[test]
    fn release_by_non_holder_is_refused() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_secs(1800));
        store.acquire(&key(), "session-a", 1).unwrap();
        let err = store.release(&key(), "session-b").unwrap_err();
        assert!(matches!(err, LockError::NotHeld));
    }

    #[test]
    fn release_on_absent_lock_is_a_no_op_success() {
        let (store, _dir) = store_with(FakeProbe::new(), Duration::from_secs(1800));
        store.release(&key(), "whoever").unwrap();
    }

    #[test]
    fn force_claim_overwrites_and_returns_previous_holder() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_secs(1800));
        store.acquire(&key(), "session-a", 1).unwrap();
        let (new_lock, previous) = store.force_claim(&key(), "session-b", 2).unwrap();
        assert_eq!(new_lock.session_id, "session-b");
        assert_eq!(previous.unwrap().session_id, "session-a");
    }

    #[test]
    fn list_reports_each_lock_with_stale_flag() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_secs(1800));
        store.acquire(&key(), "session-a", 1).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].1);
    }

    #[test]
    fn at_most_one_lock_file_exists_per_path_at_rest() {
        let (store, _dir) = store_with(FakeProbe::new().mark_alive(1), Duration::from_secs(1800));
        store.acquire(&key(), "session-a", 1).unwrap();
        let err = store.acquire(&key(), "session-b", 2).unwrap_err();
        assert!(matches!(err, LockError::Held));
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
