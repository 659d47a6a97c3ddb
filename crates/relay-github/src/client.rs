//! Thin, typed wrapper over the octocrab client, scoped to one repository.

use octocrab::Octocrab;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    #[error("missing GitHub token — set GITHUB_TOKEN or pass one explicitly")]
    MissingToken,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GitHubError {
    /// Non-retriable status classes (auth, validation, not-found) surface
    /// immediately; everything else is a candidate for retry. 403 is
    /// non-retriable in general (permission errors) except GitHub's
    /// secondary rate limit, which is also reported as 403 and is worth
    /// retrying after a backoff.
    pub fn is_retriable(&self) -> bool {
        match self {
            GitHubError::Api(octocrab::Error::GitHub { source, .. }) => match source.status_code.as_u16() {
                403 => is_secondary_rate_limit(&source.message),
                401 | 404 | 422 => false,
                _ => true,
            },
            GitHubError::Api(_) => true,
            GitHubError::MissingToken | GitHubError::Serde(_) => false,
        }
    }
}

/// GitHub reports both permission failures and secondary rate limiting as
/// 403; only the latter is worth a retry. Distinguished by message text
/// since octocrab doesn't surface a dedicated variant for it.
pub(crate) fn is_secondary_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("abuse detection")
}

/// Shell out to `gh auth token`, the GitHub CLI's own credential store,
/// trimming the trailing newline it prints. Absent `gh`, a non-zero exit,
/// or an empty result are all treated as "no credential available" rather
/// than hard errors — the caller falls through to `MissingToken`.
fn token_from_gh_cli() -> Option<String> {
    let output = std::process::Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8(output.stdout).ok()?;
    let token = token.trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub(crate) octocrab: Octocrab,
    pub(crate) owner: String,
    pub(crate) repo: String,
}

impl GitHubClient {
    /// Build a client from an explicit token and `(owner, repo)`.
    pub fn new(token: String, owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let octocrab = Octocrab::builder().personal_token(token).build()?;
        Ok(Self {
            octocrab,
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    /// Resolve the credential: explicit param → `GITHUB_TOKEN` → the `gh`
    /// CLI helper (`gh auth token`), in that order.
    pub fn resolve_token(explicit: Option<String>) -> Result<String> {
        explicit
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(token_from_gh_cli)
            .ok_or(GitHubError::MissingToken)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }
}
