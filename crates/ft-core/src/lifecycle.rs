//! Feat/task state machine.
//!
//! Task transitions: `todo | blocked -> in_progress` (start) and
//! `in_progress -> done | blocked` (finish). Feat status follows from the
//! task list through [`derive_feat_status`] after every task mutation.

use crate::error::{HarnessError, Result};
use crate::feat::Feat;
use crate::store::Store;
use crate::task::{Task, TaskList};
use crate::types::{FeatStatus, FinishResult, GateOutcome, TaskStatus};
use chrono::Utc;
use std::path::Path;

/// Feat status implied by its tasks.
///
/// in_progress while any task is in_progress; blocked when the most recently
/// finished task finished blocked; done when no todo or in_progress task is
/// left; ready otherwise.
pub fn derive_feat_status(tasks: &[Task]) -> FeatStatus {
    if tasks.iter().any(|t| t.status == TaskStatus::InProgress) {
        return FeatStatus::InProgress;
    }
    let last_finished = tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Done | TaskStatus::Blocked))
        .filter(|t| t.finished_at.is_some())
        .max_by_key(|t| t.finished_at);
    if let Some(t) = last_finished {
        if t.status == TaskStatus::Blocked {
            return FeatStatus::Blocked;
        }
    }
    let open = tasks
        .iter()
        .any(|t| matches!(t.status, TaskStatus::Todo | TaskStatus::InProgress));
    if !tasks.is_empty() && !open {
        FeatStatus::Done
    } else {
        FeatStatus::Ready
    }
}

/// The single in_progress task, computed from task status alone.
pub fn current_task(tasks: &TaskList) -> Option<&Task> {
    tasks.in_progress().next()
}

fn transition(from: impl ToString, to: impl ToString, reason: impl Into<String>) -> HarnessError {
    HarnessError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.into(),
    }
}

pub fn start(feat: &mut Feat, tasks: &mut TaskList, task_id: &str) -> Result<()> {
    if feat.status == FeatStatus::Archived {
        return Err(HarnessError::invariant(format!(
            "feat {} is archived",
            feat.feat_id
        )));
    }
    if let Some(other) = tasks.in_progress().find(|t| t.id != task_id) {
        return Err(HarnessError::invariant(format!(
            "task {} is already in_progress; finish it first",
            other.id
        )));
    }
    let task = tasks.find_mut(task_id)?;
    if !task.status.is_startable() {
        return Err(transition(
            task.status,
            TaskStatus::InProgress,
            format!("task {task_id} must be todo or blocked"),
        ));
    }
    task.status = TaskStatus::InProgress;
    if task.started_at.is_none() {
        task.started_at = Some(Utc::now());
    }
    feat.status = FeatStatus::InProgress;
    feat.current_task_id = Some(task_id.to_string());
    feat.record("task_started", task_id);
    Ok(())
}

pub fn finish(
    feat: &mut Feat,
    tasks: &mut TaskList,
    task_id: &str,
    result: FinishResult,
) -> Result<()> {
    let task = tasks.find_mut(task_id)?;
    if task.status != TaskStatus::InProgress {
        return Err(transition(
            task.status,
            result,
            format!("task {task_id} is not in_progress"),
        ));
    }
    if feat.current_task_id.as_deref() != Some(task_id) {
        return Err(HarnessError::invariant(format!(
            "current_task_id is {} but finishing {task_id}",
            feat.current_task_id.as_deref().unwrap_or("<none>")
        )));
    }
    if result == FinishResult::Done && task.gate_result != Some(GateOutcome::Pass) {
        return Err(transition(
            task.status,
            result,
            "done requires a passing gate; run the gate first",
        ));
    }

    task.status = result.task_status();
    task.finished_at = Some(Utc::now());
    feat.current_task_id = None;
    feat.counters.no_progress_rounds = 0;
    feat.status = derive_feat_status(&tasks.tasks);
    feat.record("task_finished", format!("{task_id} result={result}"));
    Ok(())
}

/// Append a todo task. A feat that had derived `done` is re-derived.
pub fn add(feat: &mut Feat, tasks: &mut TaskList, title: &str) -> Result<String> {
    if feat.status == FeatStatus::Archived {
        return Err(HarnessError::invariant(format!(
            "feat {} is archived",
            feat.feat_id
        )));
    }
    let title = title.trim();
    if title.is_empty() {
        return Err(HarnessError::Usage("task title must not be empty".into()));
    }
    let id = tasks.push_new(title)?;
    if feat.status == FeatStatus::Done {
        feat.status = derive_feat_status(&tasks.tasks);
    }
    feat.record("task_added", id.as_str());
    Ok(id)
}

// ---------------------------------------------------------------------------
// Persisted operations: re-read, mutate, save
// ---------------------------------------------------------------------------

pub fn start_task(root: &Path, feat_id: &str, task_id: &str) -> Result<(Feat, TaskList)> {
    crate::paths::validate_task_id(task_id)?;
    let store = Store::new(root);
    let (mut feat, mut tasks) = store.load(feat_id)?;
    start(&mut feat, &mut tasks, task_id)?;
    store.save(&mut feat, &mut tasks)?;
    Ok((feat, tasks))
}

pub fn finish_task(
    root: &Path,
    feat_id: &str,
    task_id: &str,
    result: FinishResult,
) -> Result<(Feat, TaskList)> {
    crate::paths::validate_task_id(task_id)?;
    let store = Store::new(root);
    let (mut feat, mut tasks) = store.load(feat_id)?;
    finish(&mut feat, &mut tasks, task_id, result)?;
    store.save(&mut feat, &mut tasks)?;
    Ok((feat, tasks))
}

pub fn add_task(root: &Path, feat_id: &str, title: &str) -> Result<(String, Feat, TaskList)> {
    let store = Store::new(root);
    let (mut feat, mut tasks) = store.load(feat_id)?;
    let id = add(&mut feat, &mut tasks, title)?;
    store.save(&mut feat, &mut tasks)?;
    Ok((id, feat, tasks))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
