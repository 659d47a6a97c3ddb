//! The on-disk persistence layout. File names are the sole
//! index; directory scanning is the only enumeration mechanism.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoreLayout {
    base: PathBuf,
}

impl StoreLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.base.join("locks")
    }

    pub fn workflow_dir(&self) -> PathBuf {
        self.base.join("workflow")
    }

    pub fn batches_dir(&self) -> PathBuf {
        self.base.join("batches")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Create the base directory and all four subdirectories if absent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.locks_dir(),
            self.workflow_dir(),
            self.batches_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn lock_path(&self, owner: &str, repo: &str, number: u64) -> PathBuf {
        self.locks_dir()
            .join(format!("{owner}_{repo}_{number}.lockdata"))
    }

    pub fn workflow_path(&self, owner: &str, repo: &str, number: u64) -> PathBuf {
        self.workflow_dir()
            .join(format!("{owner}_{repo}_{number}.json"))
    }

    pub fn batch_path(&self, batch_id: &uuid::Uuid) -> PathBuf {
        self.batches_dir().join(format!("{batch_id}.json"))
    }

    pub fn audit_log_path(&self, date: chrono::NaiveDate) -> PathBuf {
        self.logs_dir()
            .join(format!("audit-{}.jsonl", date.format("%Y-%m-%d")))
    }
}

/// Parse a `<owner>_<repo>_<n>.lockdata` file name into its parts.
pub fn parse_lock_file_name(name: &str) -> Option<(String, String, u64)> {
    let stem = name.strip_suffix(".lockdata")?;
    let (owner, rest) = stem.split_once('_')?;
    let (repo, number) = rest.rsplit_once('_')?;
    let number: u64 = number.parse().ok()?;
    Some((owner.to_string(), repo.to_string(), number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_matches_spec_pattern() {
        let layout = StoreLayout::new("/base");
        let path = layout.lock_path("acme", "widgets", 42);
        assert_eq!(path, PathBuf::from("/base/locks/acme_widgets_42.lockdata"));
    }

    #[test]
    fn parses_lock_file_name_round_trip() {
        let parsed = parse_lock_file_name("acme_widgets_42.lockdata").unwrap();
        assert_eq!(parsed, ("acme".to_string(), "widgets".to_string(), 42));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(parse_lock_file_name("not-a-lock-file.json").is_none());
    }
}
