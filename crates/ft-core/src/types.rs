use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// FeatStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatStatus {
    Proposal,
    Ready,
    InProgress,
    Blocked,
    Done,
    Archived,
}

impl FeatStatus {
    pub fn all() -> &'static [FeatStatus] {
        &[
            FeatStatus::Proposal,
            FeatStatus::Ready,
            FeatStatus::InProgress,
            FeatStatus::Blocked,
            FeatStatus::Done,
            FeatStatus::Archived,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatStatus::Proposal => "proposal",
            FeatStatus::Ready => "ready",
            FeatStatus::InProgress => "in_progress",
            FeatStatus::Blocked => "blocked",
            FeatStatus::Done => "done",
            FeatStatus::Archived => "archived",
        }
    }

    /// Statuses from which a feat may be archived.
    pub fn is_closable(self) -> bool {
        matches!(
            self,
            FeatStatus::Done | FeatStatus::Blocked | FeatStatus::Archived
        )
    }
}

impl fmt::Display for FeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatStatus {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatStatus::all()
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| HarnessError::Usage(format!("unknown feat status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl TaskStatus {
    pub fn all() -> &'static [TaskStatus] {
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Blocked,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn is_startable(self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::Blocked)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::all()
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| HarnessError::Usage(format!("unknown task status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// GateOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    Fail,
}

impl GateOutcome {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            GateOutcome::Pass
        } else {
            GateOutcome::Fail
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateOutcome::Pass => "pass",
            GateOutcome::Fail => "fail",
        }
    }

    pub fn is_pass(self) -> bool {
        self == GateOutcome::Pass
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateOutcome {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(GateOutcome::Pass),
            "fail" => Ok(GateOutcome::Fail),
            _ => Err(HarnessError::Usage(format!("unknown gate result: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// FinishResult
// ---------------------------------------------------------------------------

/// Terminal status a task may be finished with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishResult {
    Done,
    Blocked,
}

impl FinishResult {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishResult::Done => "done",
            FinishResult::Blocked => "blocked",
        }
    }

    pub fn task_status(self) -> TaskStatus {
        match self {
            FinishResult::Done => TaskStatus::Done,
            FinishResult::Blocked => TaskStatus::Blocked,
        }
    }
}

impl fmt::Display for FinishResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinishResult {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(FinishResult::Done),
            "blocked" => Ok(FinishResult::Blocked),
            _ => Err(HarnessError::Usage(format!(
                "task result must be done or blocked, got: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Ui,
    NonUi,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Ui => "ui",
            ProjectType::NonUi => "non_ui",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feat_status_parses_every_variant() {
        for status in FeatStatus::all() {
            assert_eq!(FeatStatus::from_str(status.as_str()).unwrap(), *status);
        }
        assert!(FeatStatus::from_str("finished").is_err());
    }

    #[test]
    fn task_status_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(yaml.trim(), "in_progress");
    }

    #[test]
    fn closable_statuses() {
        assert!(FeatStatus::Done.is_closable());
        assert!(FeatStatus::Blocked.is_closable());
        assert!(FeatStatus::Archived.is_closable());
        assert!(!FeatStatus::InProgress.is_closable());
        assert!(!FeatStatus::Proposal.is_closable());
    }

    #[test]
    fn finish_result_maps_to_task_status() {
        assert_eq!(FinishResult::Done.task_status(), TaskStatus::Done);
        assert_eq!(FinishResult::Blocked.task_status(), TaskStatus::Blocked);
        assert!(FinishResult::from_str("todo").is_err());
    }
}
