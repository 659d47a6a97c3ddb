//! Issue projection and the label taxonomy the priority model reads from.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical priority family: `priority:critical|high|medium|low`.
///
/// The repo-wide convention chosen as canonical.
/// `priority:P0..P3` is accepted as legacy input and coerced to this at the
/// boundary — nothing downstream of [`Priority::parse_label`] ever sees the
/// `P0..P3` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Parse a label value (the part after `priority:`), accepting both the
    /// canonical family and the legacy `P0..P3` spelling.
    pub fn parse_label(value: &str) -> Option<Self> {
        match value {
            "critical" | "P0" | "p0" => Some(Priority::Critical),
            "high" | "P1" | "p1" => Some(Priority::High),
            "medium" | "P2" | "p2" => Some(Priority::Medium),
            "low" | "P3" | "p3" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Canonical label string, e.g. `priority:high`.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Critical => "priority:critical",
            Priority::High => "priority:high",
            Priority::Medium => "priority:medium",
            Priority::Low => "priority:low",
        }
    }

    pub fn base_points(&self) -> f64 {
        match self {
            Priority::Critical => 1000.0,
            Priority::High => 100.0,
            Priority::Medium => 10.0,
            Priority::Low => 1.0,
        }
    }

    /// `true` iff `self` is at or above `ceiling` (lower enum ordinal = higher
    /// priority), used by `implement_batch`'s `maxPriority` filter.
    pub fn at_least(&self, ceiling: Priority) -> bool {
        self.rank() <= ceiling.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

/// Canonical type family: `type:bug|feature|chore|docs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Feature,
    Chore,
    Docs,
}

impl IssueType {
    pub fn parse_label(value: &str) -> Option<Self> {
        match value {
            "bug" => Some(IssueType::Bug),
            "feature" => Some(IssueType::Feature),
            "chore" => Some(IssueType::Chore),
            "docs" => Some(IssueType::Docs),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IssueType::Bug => "type:bug",
            IssueType::Feature => "type:feature",
            IssueType::Chore => "type:chore",
            IssueType::Docs => "type:docs",
        }
    }
}

/// Canonical status family: `status:backlog|in-progress|in-review|blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Backlog,
    InProgress,
    InReview,
    Blocked,
}

impl IssueStatus {
    pub fn parse_label(value: &str) -> Option<Self> {
        match value {
            "backlog" => Some(IssueStatus::Backlog),
            "in-progress" => Some(IssueStatus::InProgress),
            "in-review" => Some(IssueStatus::InReview),
            "blocked" => Some(IssueStatus::Blocked),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IssueStatus::Backlog => "status:backlog",
            IssueStatus::InProgress => "status:in-progress",
            IssueStatus::InReview => "status:in-review",
            IssueStatus::Blocked => "status:blocked",
        }
    }
}

/// The three label families the engine manages, with fixed colors and
/// descriptions it ensures exist on demand.
pub fn managed_label_families() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("priority:critical", "b60205", "Must be addressed immediately"),
        ("priority:high", "d93f0b", "High priority"),
        ("priority:medium", "fbca04", "Medium priority"),
        ("priority:low", "0e8a16", "Low priority"),
        ("type:bug", "d73a4a", "Something isn't working"),
        ("type:feature", "a2eeef", "New feature or request"),
        ("type:chore", "cfd3d7", "Maintenance task"),
        ("type:docs", "0075ca", "Documentation"),
        ("status:backlog", "ededed", "Not yet claimed"),
        ("status:in-progress", "fbca04", "Currently being worked"),
        ("status:in-review", "0e8a16", "Pull request open"),
        ("status:blocked", "e99695", "Blocked on another issue"),
    ]
}

/// An issue projected from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub labels: HashSet<String>,
    pub assignees: Vec<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

impl Issue {
    /// Derived priority class, coercing the legacy `priority:P0..P3` family.
    pub fn priority(&self) -> Option<Priority> {
        self.label_value("priority:").and_then(Priority::parse_label)
    }

    /// Derived type class.
    pub fn issue_type(&self) -> Option<IssueType> {
        self.label_value("type:").and_then(IssueType::parse_label)
    }

    /// Derived status class.
    pub fn status(&self) -> Option<IssueStatus> {
        self.label_value("status:").and_then(IssueStatus::parse_label)
    }

    /// `true` if the issue carries a `blocking`/`blocker` label.
    pub fn blocks_others(&self) -> bool {
        self.labels.contains("blocking") || self.labels.contains("blocker")
    }

    fn label_value<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        self.labels
            .iter()
            .find_map(|l| l.strip_prefix(prefix))
    }

    /// Whole days elapsed since creation, as of `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }
}
