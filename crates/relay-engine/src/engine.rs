//! The explicit `Engine` value threaded into every tool operation —
//! replaces scattered global mutable singletons for logger, remote
//! client, and workflow/batch/lock services.

use std::time::Duration;

use relay_audit::AuditLog;
use relay_core::config::Config;
use relay_github::{GitHubClient, GitHubError, RetryPolicy};
use relay_store::{BatchStore, LockStore, SignalProbe, StoreLayout, WorkflowStore};

use crate::RelayError;

pub struct Engine {
    pub github: GitHubClient,
    pub retry_policy: RetryPolicy,
    pub locks: LockStore,
    pub workflows: WorkflowStore,
    pub batches: BatchStore,
    pub audit: AuditLog,
    pub config: Config,
    pub session_id: String,
    pub pid: u32,
}

impl Engine {
    pub fn new(github: GitHubClient, config: Config, session_id: String, layout: StoreLayout) -> std::io::Result<Self> {
        layout.ensure_dirs()?;
        let locks = LockStore::new(
            layout.clone(),
            Duration::from_secs(config.locks.stale_timeout_secs),
            Box::new(SignalProbe),
        );
        let workflows = WorkflowStore::new(layout.clone());
        let batches = BatchStore::new(layout.clone(), config.batch.poll_deadline_secs);
        let audit = AuditLog::new(layout, 30);

        Ok(Self {
            github,
            retry_policy: RetryPolicy::default(),
            locks,
            workflows,
            batches,
            audit,
            config,
            session_id,
            pid: std::process::id(),
        })
    }

    pub fn owner(&self) -> &str {
        self.github.owner()
    }

    pub fn repo(&self) -> &str {
        self.github.repo()
    }
}

/// Lift a (possibly retry-exhausted) remote error to the operation-boundary
/// error taxonomy: every GitHub failure surfaces as
/// `GITHUB_API_ERROR` carrying the underlying message.
pub fn github_err(e: GitHubError) -> RelayError {
    RelayError::new(relay_core::error::ErrorCode::GithubApiError, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github() -> GitHubClient {
        GitHubClient::new("test-token".to_string(), "acme", "widgets").unwrap()
    }

    #[test]
    fn new_creates_the_store_directories_and_scopes_to_one_repo() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let engine = Engine::new(github(), Config::default(), "session-1".to_string(), layout).unwrap();

        assert_eq!(engine.owner(), "acme");
        assert_eq!(engine.repo(), "widgets");
        assert!(dir.path().join("locks").is_dir());
        assert!(dir.path().join("workflow").is_dir());
        assert!(dir.path().join("batches").is_dir());
    }

    #[test]
    fn github_err_maps_every_remote_failure_to_the_github_api_error_code() {
        let err = github_err(GitHubError::MissingToken);
        assert_eq!(err.code, relay_core::error::ErrorCode::GithubApiError);
    }
}
