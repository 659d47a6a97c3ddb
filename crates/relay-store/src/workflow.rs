//! C4 — the workflow store: per-issue phase state, transitions, and skip
//! justifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths::StoreLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Selection,
    Research,
    Branch,
    Implementation,
    Testing,
    Commit,
    Pr,
    Review,
    Merged,
    Abandoned,
}

impl Phase {
    /// Fixed linear order `selection → … → merged`, used to detect forward
    /// skips. `Abandoned` is reachable from anywhere and has no position in
    /// this order.
    const LINEAR_ORDER: [Phase; 9] = [
        Phase::Selection,
        Phase::Research,
        Phase::Branch,
        Phase::Implementation,
        Phase::Testing,
        Phase::Commit,
        Phase::Pr,
        Phase::Review,
        Phase::Merged,
    ];

    fn position(&self) -> Option<usize> {
        Self::LINEAR_ORDER.iter().position(|p| p == self)
    }

    /// `true` iff `(self, target)` is a directly-admitted transition per
    /// the transition table below.
    pub fn can_transition_directly_to(&self, target: &Phase) -> bool {
        if *target == Phase::Abandoned {
            return !matches!(self, Phase::Merged | Phase::Abandoned);
        }
        matches!(
            (self, target),
            (Phase::Selection, Phase::Research)
                | (Phase::Research, Phase::Branch)
                | (Phase::Branch, Phase::Implementation)
                | (Phase::Implementation, Phase::Testing)
                | (Phase::Testing, Phase::Commit)
                | (Phase::Commit, Phase::Pr)
                | (Phase::Pr, Phase::Review)
                | (Phase::Review, Phase::Merged)
        )
    }

    /// Intermediate phases strictly between `self` and `target` in the
    /// linear order (exclusive of both ends). Empty/`None` if `target` is
    /// not strictly later than `self` in that order.
    pub fn skipped_phases_to(&self, target: &Phase) -> Option<Vec<Phase>> {
        let from = self.position()?;
        let to = target.position()?;
        if to <= from + 1 {
            return None;
        }
        Some(Self::LINEAR_ORDER[from + 1..to].to_vec())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
    pub trigger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipJustification {
    pub skipped_phase: Phase,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub current_phase: Phase,
    pub phase_history: Vec<Transition>,
    pub skip_justifications: Vec<SkipJustification>,
    pub branch_name: Option<String>,
    pub tests_passed: Option<bool>,
    pub pr_number: Option<u64>,
}

impl WorkflowState {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, issue_number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            issue_number,
            current_phase: Phase::Selection,
            phase_history: Vec::new(),
            skip_justifications: Vec::new(),
            branch_name: None,
            tests_passed: None,
            pr_number: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("no workflow state exists for this issue")]
    NotFound,
    #[error("phase transition not permitted")]
    InvalidTransition,
    #[error("forward skip requires a non-empty justification")]
    SkipJustificationRequired,
    #[error("transitioning into commit/pr requires testsPassed or a justification")]
    TestsRequired,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Caller-supplied inputs to one `advance` call.
#[derive(Debug, Clone, Default)]
pub struct AdvanceRequest {
    pub target_phase: Phase,
    pub tests_passed: Option<bool>,
    pub skip_justification: Option<String>,
    pub trigger: String,
    pub session_id: String,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Selection
    }
}

pub struct WorkflowStore {
    layout: StoreLayout,
}

impl WorkflowStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn path(&self, owner: &str, repo: &str, number: u64) -> std::path::PathBuf {
        self.layout.workflow_path(owner, repo, number)
    }

    pub fn get(&self, owner: &str, repo: &str, number: u64) -> Result<Option<WorkflowState>> {
        let path = self.path(owner, repo, number);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whole-file replace.
    fn save(&self, state: &WorkflowState) -> Result<()> {
        let path = self.path(&state.owner, &state.repo, state.issue_number);
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn create(&self, owner: &str, repo: &str, number: u64) -> Result<WorkflowState> {
        let state = WorkflowState::new(owner, repo, number);
        self.save(&state)?;
        Ok(state)
    }

    pub fn delete(&self, owner: &str, repo: &str, number: u64) -> Result<()> {
        let path = self.path(owner, repo, number);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply one phase advance: direct
    /// transitions, forward skips with per-intermediate-phase
    /// justifications, the commit/pr tests gate, and `abandoned` always
    /// being reachable.
    pub fn advance(&self, owner: &str, repo: &str, number: u64, req: AdvanceRequest) -> Result<WorkflowState> {
        let mut state = self.get(owner, repo, number)?.ok_or(WorkflowError::NotFound)?;
        let from = state.current_phase;
        let now = Utc::now();

        if from.can_transition_directly_to(&req.target_phase) {
            self.check_tests_gate(&req)?;
            self.record_transition(&mut state, from, req.target_phase, now, &req.trigger);
        } else if let Some(skipped) = from.skipped_phases_to(&req.target_phase) {
            self.check_tests_gate(&req)?;
            let justification = req
                .skip_justification
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or(WorkflowError::SkipJustificationRequired)?;
            for phase in skipped {
                state.skip_justifications.push(SkipJustification {
                    skipped_phase: phase,
                    text: justification.clone(),
                    timestamp: now,
                    session_id: req.session_id.clone(),
                });
            }
            self.record_transition(&mut state, from, req.target_phase, now, &req.trigger);
        } else {
            return Err(WorkflowError::InvalidTransition);
        }

        if let Some(tests_passed) = req.tests_passed {
            state.tests_passed = Some(tests_passed);
        }

        self.save(&state)?;
        Ok(state)
    }

    fn check_tests_gate(&self, req: &AdvanceRequest) -> Result<()> {
        if matches!(req.target_phase, Phase::Commit | Phase::Pr) {
            let has_tests = req.tests_passed.unwrap_or(false);
            let has_justification = req
                .skip_justification
                .as_ref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !has_tests && !has_justification {
                return Err(WorkflowError::TestsRequired);
            }
        }
        Ok(())
    }

    fn record_transition(
        &self,
        state: &mut WorkflowState,
        from: Phase,
        to: Phase,
        now: DateTime<Utc>,
        trigger: &str,
    ) {
        state.phase_history.push(Transition {
            from,
            to,
            timestamp: now,
            trigger: trigger.to_string(),
        });
        state.current_phase = to;
    }

    pub fn set_branch_name(&self, owner: &str, repo: &str, number: u64, branch: String) -> Result<()> {
        let mut state = self.get(owner, repo, number)?.ok_or(WorkflowError::NotFound)?;
        state.branch_name = Some(branch);
        self.save(&state)
    }

    pub fn set_pr_number(&self, owner: &str, repo: &str, number: u64, pr_number: u64) -> Result<()> {
        let mut state = self.get(owner, repo, number)?.ok_or(WorkflowError::NotFound)?;
        state.pr_number = Some(pr_number);
        self.save(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (WorkflowStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        (WorkflowStore::new(layout), dir)
    }

    fn req(target: Phase) -> AdvanceRequest {
        AdvanceRequest {
            target_phase: target,
            tests_passed: None,
            skip_justification: None,
            trigger: "test".into(),
            session_id: "s1".into(),
        }
    }

    #[test]
    fn direct_transitions_chain_through_to_commit_gate() {
        let (store, _dir) = store();
        store.create("o", "r", 1).unwrap();
        store.advance("o", "r", 1, req(Phase::Research)).unwrap();
        store.advance("o", "r", 1, req(Phase::Branch)).unwrap();
        store.advance("o", "r", 1, req(Phase::Implementation)).unwrap();
        let state = store.advance("o", "r", 1, req(Phase::Testing)).unwrap();
        assert_eq!(state.current_phase, Phase::Testing);
    }

    #[test]
    fn gate_blocks_premature_pr_scenario() {
        // gate blocks premature pr without tests
        let (store, _dir) = store();
        store.create("o", "r", 42).unwrap();
        store.advance("o", "r", 42, req(Phase::Research)).unwrap();
        store.advance("o", "r", 42, req(Phase::Branch)).unwrap();
        store.advance("o", "r", 42, req(Phase::Implementation)).unwrap();
        store.advance("o", "r", 42, req(Phase::Testing)).unwrap();

        let mut pr_req = req(Phase::Pr);
        pr_req.tests_passed = None;
        pr_req.skip_justification = None;
        let err = store.advance("o", "r", 42, pr_req).unwrap_err();
        assert!(matches!(err, WorkflowError::TestsRequired));

        let state = store.get("o", "r", 42).unwrap().unwrap();
        assert_eq!(state.current_phase, Phase::Testing);
    }

    #[test]
    fn tests_passed_true_satisfies_the_gate() {
        let (store, _dir) = store();
        store.create("o", "r", 1).unwrap();
        store.advance("o", "r", 1, req(Phase::Research)).unwrap();
        store.advance("o", "r", 1, req(Phase::Branch)).unwrap();
        store.advance("o", "r", 1, req(Phase::Implementation)).unwrap();
        store.advance("o", "r", 1, req(Phase::Testing)).unwrap();

        let mut commit_req = req(Phase::Commit);
        commit_req.tests_passed = Some(true);
        let state = store.advance("o", "r", 1, commit_req).unwrap();
        assert_eq!(state.current_phase, Phase::Commit);
    }

    #[test]
    fn forward_skip_requires_justification_and_fills_intermediate_records() {
        let (store, _dir) = store();
        store.create("o", "r", 1).unwrap();

        let mut skip_req = req(Phase::Implementation);
        skip_req.skip_justification = None;
        let err = store.advance("o", "r", 1, skip_req).unwrap_err();
        assert!(matches!(err, WorkflowError::SkipJustificationRequired));

        let mut skip_req = req(Phase::Implementation);
        skip_req.skip_justification = Some("prototype already exists".into());
        let state = store.advance("o", "r", 1, skip_req).unwrap();
        assert_eq!(state.current_phase, Phase::Implementation);
        assert_eq!(state.skip_justifications.len(), 2); // research, branch
    }

    #[test]
    fn abandoned_is_always_reachable() {
        let (store, _dir) = store();
        store.create("o", "r", 1).unwrap();
        let state = store.advance("o", "r", 1, req(Phase::Abandoned)).unwrap();
        assert_eq!(state.current_phase, Phase::Abandoned);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let (store, _dir) = store();
        store.create("o", "r", 1).unwrap();
        let err = store.advance("o", "r", 1, req(Phase::Merged)).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition));
    }

    #[test]
    fn every_history_entry_is_admitted() {
        let (store, _dir) = store();
        store.create("o", "r", 1).unwrap();
        store.advance("o", "r", 1, req(Phase::Research)).unwrap();
        store.advance("o", "r", 1, req(Phase::Branch)).unwrap();
        let state = store.get("o", "r", 1).unwrap().unwrap();
        for t in &state.phase_history {
            assert!(t.from.can_transition_directly_to(&t.to) || t.from.skipped_phases_to(&t.to).is_some());
        }
    }
}
