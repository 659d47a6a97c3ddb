//! C2 — the remote client: a typed wrapper over the GitHub endpoints the
//! engine needs, with throttled retry.

pub mod branches;
pub mod checks;
pub mod client;
pub mod issues;
pub mod labels;
pub mod pull_requests;
pub mod retry;
pub mod reviews;
pub mod sub_issues;
pub mod types;

pub use client::{GitHubClient, GitHubError, Result};
pub use retry::{with_retry, RetryPolicy};
