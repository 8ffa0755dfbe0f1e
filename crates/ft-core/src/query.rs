use crate::error::Result;
use crate::feat::Feat;
use crate::store::{Index, Store};
use crate::task::{TaskList, TaskStats};
use crate::types::{FeatStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// One row of `ft query list`: index entry joined with live task counts.
#[derive(Debug, Clone, Serialize)]
pub struct FeatSummary {
    pub feat_id: String,
    pub title: String,
    pub status: FeatStatus,
    pub branch: String,
    pub worktree: String,
    pub updated_at: DateTime<Utc>,
    pub current_task_id: Option<String>,
    pub task_stats: TaskStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatDetail {
    pub state: Feat,
    pub tasks: TaskList,
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub feat_status: Option<FeatStatus>,
    /// Keep feats with at least one task in this status.
    pub task_status: Option<TaskStatus>,
    /// Case-insensitive substring over id, title and branch.
    pub contains: Option<String>,
}

impl Filter {
    pub fn matches(&self, item: &FeatSummary) -> bool {
        if self.feat_status.is_some_and(|s| s != item.status) {
            return false;
        }
        if let Some(ts) = self.task_status {
            let n = match ts {
                TaskStatus::Todo => item.task_stats.todo,
                TaskStatus::InProgress => item.task_stats.in_progress,
                TaskStatus::Done => item.task_stats.done,
                TaskStatus::Blocked => item.task_stats.blocked,
            };
            if n == 0 {
                return false;
            }
        }
        if let Some(needle) = self.contains.as_deref().filter(|n| !n.is_empty()) {
            let hay = format!("{} {} {}", item.feat_id, item.title, item.branch).to_lowercase();
            if !hay.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Every indexed feat whose documents load; unreadable feats are skipped.
pub fn list(root: &Path) -> Result<Vec<FeatSummary>> {
    let index = Index::load(root)?;
    let store = Store::new(root);
    Ok(index
        .feats
        .iter()
        .filter_map(|e| store.load(&e.feat_id).ok())
        .map(|(feat, tasks)| FeatSummary {
            task_stats: TaskStats::of(&tasks.tasks),
            feat_id: feat.feat_id,
            title: feat.title,
            status: feat.status,
            branch: feat.branch,
            worktree: feat.worktree_path,
            updated_at: feat.updated_at,
            current_task_id: feat.current_task_id,
        })
        .collect())
}

pub fn get(root: &Path, feat_id: &str) -> Result<FeatDetail> {
    let (state, tasks) = Store::new(root).load(feat_id)?;
    Ok(FeatDetail { state, tasks })
}

pub fn filter(root: &Path, f: &Filter) -> Result<Vec<FeatSummary>> {
    Ok(list(root)?.into_iter().filter(|i| f.matches(i)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::store::{init, testing::seed};
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        seed(dir.path(), "f-20250101-login-fix");
        seed(dir.path(), "f-20250102-billing");
        lifecycle::start_task(dir.path(), "f-20250102-billing", "T-001").unwrap();
        dir
    }

    #[test]
    fn list_joins_task_stats() {
        let dir = setup();
        let items = list(dir.path()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].feat_id, "f-20250101-login-fix");
        assert_eq!(items[0].task_stats.todo, 1);
        assert_eq!(items[1].task_stats.in_progress, 1);
        assert_eq!(items[1].current_task_id.as_deref(), Some("T-001"));
    }

    #[test]
    fn list_skips_unreadable_feats() {
        let dir = setup();
        std::fs::remove_file(
            dir.path()
                .join(".harness/feats/f-20250101-login-fix/state.yaml"),
        )
        .unwrap();
        let items = list(dir.path()).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn filters_combine() {
        let dir = setup();
        let by_status = filter(
            dir.path(),
            &Filter {
                feat_status: Some(FeatStatus::InProgress),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].feat_id, "f-20250102-billing");

        let by_task = filter(
            dir.path(),
            &Filter {
                task_status: Some(TaskStatus::Todo),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_task.len(), 1);
        assert_eq!(by_task[0].feat_id, "f-20250101-login-fix");

        let by_text = filter(
            dir.path(),
            &Filter {
                contains: Some("LOGIN".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_text.len(), 1);
    }

    #[test]
    fn get_returns_both_documents() {
        let dir = setup();
        let detail = get(dir.path(), "f-20250102-billing").unwrap();
        assert_eq!(detail.state.current_task_id.as_deref(), Some("T-001"));
        assert_eq!(detail.tasks.tasks.len(), 1);
        assert!(get(dir.path(), "f-20250103-none").is_err());
    }
}
