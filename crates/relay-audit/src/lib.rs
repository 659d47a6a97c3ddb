//! C6 — the audit log: an append-only, daily-rotated JSONL record of every
//! operation the engine performs.

use std::io::{BufRead, Write};

use chrono::{DateTime, NaiveDate, Utc};
use relay_store::StoreLayout;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One durable record. `details` is a free-form JSON bag so each operation
/// can attach whatever it needs without the audit schema growing a field per
/// caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub level: Level,
    pub session_id: String,
    pub operation: String,
    #[serde(default)]
    pub kind: RecordKind,
    pub owner: String,
    pub repo: String,
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    pub outcome: Outcome,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Value,
}

/// Mirrors the `tracing` level the record was logged at; kept distinct from
/// `Outcome` so a successful-but-notable event (force-claim) can still be
/// flagged at warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Info,
    Warn,
    Error,
}

/// Distinguishes the per-operation record every tool call emits from the
/// supplemental records mutating operations also emit for lock events and
/// phase transitions. Retention sweeps use this to keep lock-event lines
/// around longer than the general floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Operation,
    LockEvent,
    PhaseTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

impl AuditRecord {
    pub fn new(
        session_id: impl Into<String>,
        operation: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level: Level::Info,
            session_id: session_id.into(),
            operation: operation.into(),
            kind: RecordKind::Operation,
            owner: owner.into(),
            repo: repo.into(),
            issue_number: None,
            phase: None,
            duration_secs: None,
            outcome,
            error: None,
            details: Value::Null,
        }
    }

    /// A supplemental record for one lock acquire/release event, retained
    /// under the longer lock-event window regardless of the general floor.
    pub fn lock_event(
        session_id: impl Into<String>,
        operation: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self::new(session_id, operation, owner, repo, outcome).with_kind(RecordKind::LockEvent)
    }

    /// A supplemental record for one workflow phase transition.
    pub fn phase_transition(
        session_id: impl Into<String>,
        operation: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self::new(session_id, operation, owner, repo, outcome).with_kind(RecordKind::PhaseTransition)
    }

    pub fn with_issue(mut self, issue_number: u64) -> Self {
        self.issue_number = Some(issue_number);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_duration(mut self, duration: chrono::Duration) -> Self {
        self.duration_secs = Some(duration.num_milliseconds() as f64 / 1000.0);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Lock-event records are retained at least this long regardless of the
/// general retention floor (spec §3/§4.6).
pub const LOCK_EVENT_RETENTION_DAYS: i64 = 90;

pub struct AuditLog {
    layout: StoreLayout,
    retention: chrono::Duration,
}

impl AuditLog {
    pub fn new(layout: StoreLayout, retention_days: i64) -> Self {
        Self {
            layout,
            retention: chrono::Duration::days(retention_days),
        }
    }

    /// Append one record to today's log file. Opens in append mode so
    /// concurrent writers from the same process interleave whole lines
    /// rather than corrupting each other (each `write_all` call here is a
    /// single line, written once).
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        std::fs::create_dir_all(self.layout.logs_dir())?;
        let path = self.layout.audit_log_path(record.timestamp.date_naive());
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every well-formed record for `date`. Lines that fail to parse
    /// are skipped rather than failing the whole read — an audit log is a
    /// best-effort trail, not a source of truth the engine depends on.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<AuditRecord>> {
        let path = self.layout.audit_log_path(date);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = std::io::BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Delete daily log files older than the configured retention window.
    /// A file past the general floor but within the lock-event floor is kept
    /// if it contains any lock-event record. Returns the number removed.
    pub fn sweep_retention(&self) -> Result<usize> {
        let dir = self.layout.logs_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let general_cutoff = Utc::now() - self.retention;
        let lock_cutoff = Utc::now() - chrono::Duration::days(LOCK_EVENT_RETENTION_DAYS).max(self.retention);
        let mut removed = 0;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            let Some(date) = parse_audit_file_date(name) else { continue };
            let date_time = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
            if date_time >= general_cutoff {
                continue;
            }
            if date_time >= lock_cutoff && self.file_has_lock_event(&entry.path())? {
                continue;
            }
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }

    fn file_has_lock_event(&self, path: &std::path::Path) -> Result<bool> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let reader = std::io::BufReader::new(file);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
                if record.kind == RecordKind::LockEvent {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn parse_audit_file_date(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_prefix("audit-")?.strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(retention_days: i64) -> (AuditLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        (AuditLog::new(layout, retention_days), dir)
    }

    #[test]
    fn append_then_read_day_round_trips() {
        let (log, _dir) = log(30);
        let record = AuditRecord::new("s1", "select_next_issue", "acme", "widgets", Outcome::Success)
            .with_issue(42)
            .with_details(serde_json::json!({"score": 107.0}));
        log.append(&record).unwrap();

        let records = log.read_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "select_next_issue");
        assert_eq!(records[0].issue_number, Some(42));
    }

    #[test]
    fn multiple_appends_accumulate_in_one_file() {
        let (log, _dir) = log(30);
        for i in 0..5 {
            let record = AuditRecord::new("s1", "op", "acme", "widgets", Outcome::Success).with_issue(i);
            log.append(&record).unwrap();
        }
        let records = log.read_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let (log, dir) = log(30);
        let record = AuditRecord::new("s1", "op", "acme", "widgets", Outcome::Success);
        log.append(&record).unwrap();

        let path = dir.path().join("logs").join(format!("audit-{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"not json at all\n").unwrap();

        let records = log.read_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_day_reads_as_empty() {
        let (log, _dir) = log(30);
        let records = log.read_day(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn sweep_retention_removes_only_files_past_the_window() {
        let (log, dir) = log(7);
        let logs_dir = dir.path().join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();
        std::fs::write(logs_dir.join("audit-2000-01-01.jsonl"), "").unwrap();
        let recent_name = format!("audit-{}.jsonl", Utc::now().format("%Y-%m-%d"));
        std::fs::write(logs_dir.join(&recent_name), "").unwrap();

        let removed = log.sweep_retention().unwrap();
        assert_eq!(removed, 1);
        assert!(!logs_dir.join("audit-2000-01-01.jsonl").exists());
        assert!(logs_dir.join(&recent_name).exists());
    }

    #[test]
    fn lock_event_file_survives_past_the_general_floor() {
        let (log, dir) = log(30);
        let logs_dir = dir.path().join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();

        let old_name = format!("audit-{}.jsonl", (Utc::now() - chrono::Duration::days(40)).format("%Y-%m-%d"));
        let lock_record = AuditRecord::lock_event("s1", "lock_acquire", "acme", "widgets", Outcome::Success).with_issue(1);
        std::fs::write(logs_dir.join(&old_name), format!("{}\n", serde_json::to_string(&lock_record).unwrap())).unwrap();

        let plain_name = format!("audit-{}.jsonl", (Utc::now() - chrono::Duration::days(45)).format("%Y-%m-%d"));
        let plain_record = AuditRecord::new("s1", "select_next_issue", "acme", "widgets", Outcome::Success);
        std::fs::write(logs_dir.join(&plain_name), format!("{}\n", serde_json::to_string(&plain_record).unwrap())).unwrap();

        let removed = log.sweep_retention().unwrap();
        assert_eq!(removed, 1);
        assert!(logs_dir.join(&old_name).exists(), "file containing a lock event should survive past the general floor");
        assert!(!logs_dir.join(&plain_name).exists());
    }

    #[test]
    fn lock_event_file_is_removed_once_past_the_lock_floor() {
        let (log, dir) = log(30);
        let logs_dir = dir.path().join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();

        let ancient_name = "audit-2000-01-01.jsonl".to_string();
        let lock_record = AuditRecord::lock_event("s1", "lock_acquire", "acme", "widgets", Outcome::Success);
        std::fs::write(logs_dir.join(&ancient_name), format!("{}\n", serde_json::to_string(&lock_record).unwrap())).unwrap();

        let removed = log.sweep_retention().unwrap();
        assert_eq!(removed, 1);
        assert!(!logs_dir.join(&ancient_name).exists());
    }

    #[test]
    fn builder_methods_set_the_expanded_schema_fields() {
        let record = AuditRecord::new("s1", "force_claim", "acme", "widgets", Outcome::Skipped)
            .with_level(Level::Warn)
            .with_kind(RecordKind::LockEvent)
            .with_phase("testing")
            .with_duration(chrono::Duration::milliseconds(1500))
            .with_error("boom");

        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.kind, RecordKind::LockEvent);
        assert_eq!(record.phase.as_deref(), Some("testing"));
        assert_eq!(record.duration_secs, Some(1.5));
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert_eq!(record.outcome, Outcome::Skipped);
    }

    #[test]
    fn parses_audit_file_date() {
        assert_eq!(
            parse_audit_file_date("audit-2026-07-27.jsonl"),
            NaiveDate::from_ymd_opt(2026, 7, 27)
        );
        assert_eq!(parse_audit_file_date("not-an-audit-file.json"), None);
    }
}
