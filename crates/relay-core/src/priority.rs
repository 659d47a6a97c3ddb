//! C1 — the deterministic priority model: scoring, ordering, and the filter
//! pipeline applied before scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::{Issue, IssueType};

const MAX_AGE_BONUS_DAYS: i64 = 30;
const BLOCKING_MULTIPLIER: f64 = 1.5;
const BLOCKED_PENALTY: f64 = 0.1;

/// A computed, non-persisted score for one issue.
///
/// Pure function of `(labels, created_at, blocking-relationship,
/// open-parent-presence, now)` — two calls on identical inputs within the
/// same day produce identical `total_score`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityScore {
    pub base_points: f64,
    pub age_bonus: f64,
    pub blocking_multiplier: f64,
    pub blocked_penalty: f64,
    pub total_score: f64,
    pub issue_number: u64,
}

/// Inputs the scorer needs beyond what `Issue` itself carries — the
/// sub-issue parent lookup is advisory and fetched separately (C2), so it is
/// threaded in rather than stored on `Issue`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext {
    pub has_open_parent: bool,
}

/// Compute the deterministic score for one issue as of `now`.
pub fn calculate_score(issue: &Issue, ctx: ScoringContext, now: DateTime<Utc>) -> PriorityScore {
    let base_points = issue.priority().map(|p| p.base_points()).unwrap_or(0.0);
    let age_bonus = issue.age_days(now).min(MAX_AGE_BONUS_DAYS) as f64;
    let blocking_multiplier = if issue.blocks_others() {
        BLOCKING_MULTIPLIER
    } else {
        1.0
    };
    let blocked_penalty = if ctx.has_open_parent {
        BLOCKED_PENALTY
    } else {
        1.0
    };
    let total_score = (base_points + age_bonus) * blocking_multiplier * blocked_penalty;

    PriorityScore {
        base_points,
        age_bonus,
        blocking_multiplier,
        blocked_penalty,
        total_score,
        issue_number: issue.number,
    }
}

/// A candidate issue paired with its computed score, ordered by
/// [`order_candidates`].
#[derive(Debug, Clone)]
pub struct ScoredIssue {
    pub issue: Issue,
    pub score: PriorityScore,
}

/// Descending total score; ties broken by ascending issue number (FIFO).
/// Produces a total order — no two elements can compare equal unless
/// `issue_number` is equal too.
pub fn order_candidates(mut scored: Vec<ScoredIssue>) -> Vec<ScoredIssue> {
    scored.sort_by(|a, b| {
        b.score
            .total_score
            .partial_cmp(&a.score.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.score.issue_number.cmp(&b.score.issue_number))
    });
    scored
}

/// Filters applied before scoring, in this fixed order:
/// drop in-progress, drop assigned, keep-only include-types, drop
/// exclude-types. Order-preserving: only drops elements, never reorders.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub include_types: Option<Vec<IssueType>>,
    pub exclude_types: Option<Vec<IssueType>>,
}

pub fn apply_filters(candidates: Vec<Issue>, opts: &FilterOptions) -> Vec<Issue> {
    candidates
        .into_iter()
        .filter(|i| i.status() != Some(crate::issue::IssueStatus::InProgress))
        .filter(|i| i.assignees.is_empty())
        .filter(|i| match &opts.include_types {
            Some(types) => i.issue_type().map(|t| types.contains(&t)).unwrap_or(false),
            None => true,
        })
        .filter(|i| match &opts.exclude_types {
            Some(types) => !i.issue_type().map(|t| types.contains(&t)).unwrap_or(false),
            None => true,
        })
        .collect()
}
