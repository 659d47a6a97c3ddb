//! Repository resolution: explicit argument → `GITHUB_REPOSITORY`
//! env (`owner/repo`) → `GITHUB_OWNER` + `GITHUB_REPO` pair → `REPO_REQUIRED`.

use crate::config::Config;
use crate::error::{ErrorCode, RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Resolve a repository reference following the fixed precedence order.
/// `explicit` is `owner/repo` as supplied directly by the caller, if any.
pub fn resolve_repo(explicit: Option<&str>, config: &Config) -> Result<RepoRef> {
    if let Some(spec) = explicit {
        return parse_owner_repo(spec);
    }

    if let Ok(spec) = std::env::var("GITHUB_REPOSITORY") {
        return parse_owner_repo(&spec);
    }

    if let (Ok(owner), Ok(repo)) = (std::env::var("GITHUB_OWNER"), std::env::var("GITHUB_REPO")) {
        return Ok(RepoRef { owner, repo });
    }

    if let (Some(owner), Some(repo)) = (&config.github.default_owner, &config.github.default_repo) {
        return Ok(RepoRef {
            owner: owner.clone(),
            repo: repo.clone(),
        });
    }

    Err(RelayError::new(
        ErrorCode::RepoRequired,
        "repository not resolved: pass it explicitly, set GITHUB_REPOSITORY, or set GITHUB_OWNER/GITHUB_REPO",
    ))
}

fn parse_owner_repo(spec: &str) -> Result<RepoRef> {
    match spec.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok(RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        _ => Err(RelayError::new(
            ErrorCode::RepoRequired,
            format!("malformed repository reference: '{spec}', expected 'owner/repo'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        std::env::remove_var("GITHUB_REPOSITORY");
        std::env::remove_var("GITHUB_OWNER");
        std::env::remove_var("GITHUB_REPO");
    }

    #[test]
    fn explicit_argument_wins() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GITHUB_REPOSITORY", "env-owner/env-repo");
        let resolved = resolve_repo(Some("explicit-owner/explicit-repo"), &Config::default()).unwrap();
        assert_eq!(resolved.owner, "explicit-owner");
        clear_env();
    }

    #[test]
    fn env_repository_var_used_next() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GITHUB_REPOSITORY", "acme/widgets");
        let resolved = resolve_repo(None, &Config::default()).unwrap();
        assert_eq!(resolved.full_name(), "acme/widgets");
        clear_env();
    }

    #[test]
    fn owner_repo_pair_used_last_before_config() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GITHUB_OWNER", "acme");
        std::env::set_var("GITHUB_REPO", "widgets");
        let resolved = resolve_repo(None, &Config::default()).unwrap();
        assert_eq!(resolved.full_name(), "acme/widgets");
        clear_env();
    }

    #[test]
    fn unresolved_repo_is_an_error() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = resolve_repo(None, &Config::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RepoRequired);
    }
}
