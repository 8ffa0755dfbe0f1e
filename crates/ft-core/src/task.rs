use crate::error::{HarnessError, Result};
use crate::gate::CommandRecord;
use crate::paths;
use crate::types::{GateOutcome, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub gate_result: Option<GateOutcome>,
    #[serde(default)]
    pub last_gate_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_gate_commands: Vec<CommandRecord>,
    #[serde(default)]
    pub last_commit_hash: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            summary: title.clone(),
            title,
            status: TaskStatus::Todo,
            gate_result: None,
            last_gate_at: None,
            last_gate_commands: Vec::new(),
            last_commit_hash: None,
            started_at: None,
            finished_at: None,
            notes: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskList (tasks.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub version: u32,
    pub feat_id: String,
    pub updated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl TaskList {
    pub fn new(feat_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            version: 1,
            feat_id: feat_id.into(),
            updated_at: Utc::now(),
            tasks,
        }
    }

    pub fn find(&self, id: &str) -> Result<&Task> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| self.not_found(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Result<&mut Task> {
        let feat = self.feat_id.clone();
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(HarnessError::TaskNotFound {
                feat,
                task: id.to_string(),
            })
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
    }

    /// Append a new todo task under the next free identifier.
    pub fn push_new(&mut self, title: impl Into<String>) -> Result<String> {
        let id = next_task_id(&self.tasks)?;
        self.tasks.push(Task::new(id.clone(), title));
        Ok(id)
    }

    fn not_found(&self, id: &str) -> HarnessError {
        HarnessError::TaskNotFound {
            feat: self.feat_id.clone(),
            task: id.to_string(),
        }
    }
}

/// Per-status counts, in the fixed order todo / in_progress / done / blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub blocked: usize,
}

impl TaskStats {
    pub fn of(tasks: &[Task]) -> Self {
        let mut stats = TaskStats {
            total: tasks.len(),
            ..Default::default()
        };
        for t in tasks {
            match t.status {
                TaskStatus::Todo => stats.todo += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Done => stats.done += 1,
                TaskStatus::Blocked => stats.blocked += 1,
            }
        }
        stats
    }
}

/// Identifiers need not be contiguous; the next one is max + 1.
pub fn next_task_id(tasks: &[Task]) -> Result<String> {
    let max = tasks
        .iter()
        .filter(|t| paths::is_valid_task_id(&t.id))
        .filter_map(|t| t.id[2..].parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let next = max + 1;
    if next > 999 {
        return Err(HarnessError::invariant(
            "task identifier space exhausted (T-999)",
        ));
    }
    Ok(format!("T-{next:03}"))
}

/// Render the derived checklist (`tasks.md`). Not authoritative; regenerated
/// on every save.
pub fn render_checklist(feat_id: &str, tasks: &[Task]) -> String {
    let mut out = format!(
        "# Feat Tasks: {feat_id}\n\nSource of truth: `{}`\n\n## Task Checklist\n",
        paths::TASKS_FILE
    );
    for t in tasks {
        let mark = if t.status == TaskStatus::Done { "x" } else { " " };
        out.push_str(&format!("- [{mark}] {} {}\n", t.id, t.title));
    }
    out.push_str("\n## Status Legend\n");
    for s in TaskStatus::all() {
        out.push_str(&format!("- {s}\n"));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
