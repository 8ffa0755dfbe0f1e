use crate::error::Result;
use crate::gate::CommandRecord;
use crate::git::Git;
use crate::io;
use crate::paths;
use crate::store::{self, Index};
use crate::task::{Task, TaskList};
use crate::types::{FeatStatus, GateOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Counters / GateSnapshot / HistoryEntry / CleanupRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default)]
    pub gate_fail_streak: i64,
    #[serde(default)]
    pub no_progress_rounds: i64,
    #[serde(default)]
    pub round_count: i64,
}

/// Most recent gate run, whichever task it was for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateSnapshot {
    #[serde(default)]
    pub last_result: Option<GateOutcome>,
    #[serde(default)]
    pub last_task_id: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_check_commands: Vec<CommandRecord>,
    #[serde(default)]
    pub last_log_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRecord {
    pub base_ref: String,
    pub branch_merged: bool,
    pub worktree_removed: bool,
    pub branch_deleted: bool,
    #[serde(default)]
    pub note: String,
}

// ---------------------------------------------------------------------------
// Feat (state.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feat {
    pub version: u32,
    pub feat_id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub goal: String,
    pub status: FeatStatus,
    pub base_ref: String,
    pub branch: String,
    pub worktree_name: String,
    pub worktree_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub gate: GateSnapshot,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_from_status: Option<FeatStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_cleanup: Option<CleanupRecord>,
}

impl Feat {
    pub fn new(
        feat_id: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
        goal: impl Into<String>,
        base_ref: impl Into<String>,
    ) -> Self {
        let feat_id = feat_id.into();
        let now = Utc::now();
        Self {
            version: 1,
            branch: paths::branch_name(&feat_id),
            worktree_name: paths::worktree_name(&feat_id),
            worktree_path: paths::worktree_rel(&feat_id).to_string_lossy().into_owned(),
            feat_id,
            title: title.into(),
            slug: slug.into(),
            goal: goal.into(),
            status: FeatStatus::Proposal,
            base_ref: base_ref.into(),
            created_at: now,
            updated_at: now,
            current_task_id: None,
            counters: Counters::default(),
            gate: GateSnapshot::default(),
            history: Vec::new(),
            closed_from_status: None,
            archived_at: None,
            archived_cleanup: None,
        }
    }

    pub fn record(&mut self, action: &str, detail: impl Into<String>) {
        let now = Utc::now();
        self.history.push(HistoryEntry {
            at: now,
            action: action.to_string(),
            detail: detail.into(),
        });
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateFeat<'a> {
    pub title: &'a str,
    /// Defaults to the slugified title.
    pub slug: Option<&'a str>,
    pub goal: &'a str,
    pub first_task: Option<&'a str>,
}

const UI_EVIDENCE_TEMPLATE: &str = "\
# UI Verification

## Critical Paths
-

## Screenshots
-

## Console Errors
- console errors:
";

fn render_proposal(feat: &Feat) -> String {
    format!(
        "# Proposal: {title}\n\n\
         - Feat ID: `{id}`\n\
         - Branch: `{branch}`\n\
         - Base: `{base}`\n\n\
         ## Goal\n\n{goal}\n\n\
         ## Scope\n\n- \n\n\
         ## Acceptance\n\n- \n",
        title = feat.title,
        id = feat.feat_id,
        branch = feat.branch,
        base = feat.base_ref,
        goal = if feat.goal.is_empty() { "TBD" } else { &feat.goal },
    )
}

/// `f-<yyyymmdd>-<slug>`, then `-2`, `-3`, ... until unused in the index and
/// in both stores.
pub fn allocate_feat_id(root: &Path, index: &Index, slug: &str) -> String {
    let base = format!("f-{}-{slug}", Utc::now().format("%Y%m%d"));
    let taken = |id: &str| {
        index.find(id).is_some()
            || paths::active_feats_dir(root).join(id).exists()
            || paths::archived_feats_dir(root).join(id).exists()
    };
    if !taken(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Allocate an identifier, create the branch and working copy, scaffold the
/// feat directory and persist both documents.
pub fn create_feat(root: &Path, req: &CreateFeat<'_>) -> Result<(Feat, TaskList)> {
    store::ensure_initialized(root)?;
    let git = Git::new(root);
    git.ensure_repo()?;

    let slug = paths::slugify(req.slug.unwrap_or(req.title))?;
    let index = Index::load(root)?;
    let feat_id = allocate_feat_id(root, &index, &slug);
    paths::validate_feat_id(&feat_id)?;
    let base = git.pick_base_branch()?;

    let mut feat = Feat::new(&feat_id, req.title, &slug, req.goal, &base);
    let worktree = root.join(&feat.worktree_path);
    git.worktree_add(&worktree, &feat.branch, &base)?;
    info!(feat = %feat_id, branch = %feat.branch, base = %base, "created branch and worktree");

    let dir = paths::feat_dir(root, &feat_id, feat.status);
    let tasks = match scaffold(root, &dir, &mut feat, req.first_task) {
        Ok(tasks) => tasks,
        Err(e) => {
            rollback(&git, &worktree, &feat.branch, &dir);
            return Err(e);
        }
    };
    Ok((feat, tasks))
}

fn scaffold(
    root: &Path,
    dir: &Path,
    feat: &mut Feat,
    first_task: Option<&str>,
) -> Result<TaskList> {
    io::ensure_dir(&dir.join(paths::FEAT_ARTIFACTS_DIR))?;
    io::write_if_missing(&dir.join(paths::PROPOSAL_FILE), render_proposal(feat).as_bytes())?;
    io::write_if_missing(
        &dir.join(paths::UI_EVIDENCE_FILE),
        UI_EVIDENCE_TEMPLATE.as_bytes(),
    )?;

    let first = first_task.unwrap_or("Define implementation plan");
    let tasks = TaskList::new(&feat.feat_id, vec![Task::new("T-001", first)]);
    let detail = format!("base_ref={}", feat.base_ref);
    feat.record("feat_created", detail);

    store::create(root, feat, &tasks)?;
    Ok(tasks)
}

/// Undo a half-finished creation so a retry starts from a clean repo.
/// Best effort: each step is attempted even if an earlier one failed.
fn rollback(git: &Git, worktree: &Path, branch: &str, dir: &Path) {
    if let Err(e) = git.worktree_remove(worktree) {
        warn!(worktree = %worktree.display(), error = %e, "could not remove worktree after failed create");
    }
    if let Err(e) = git.delete_branch(branch) {
        warn!(branch, error = %e, "could not delete branch after failed create");
    }
    if dir.is_dir() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "could not remove feat dir after failed create");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::init_repo;
    use crate::store::{init, Store};
    use tempfile::TempDir;

    #[test]
    fn new_feat_derives_names() {
        let f = Feat::new("f-20250101-login-fix", "Login fix", "login-fix", "", "main");
        assert_eq!(f.branch, "feat/f-20250101-login-fix");
        assert_eq!(f.worktree_name, "wt-f-20250101-login-fix");
        assert_eq!(f.worktree_path, ".worktrees/wt-f-20250101-login-fix");
        assert_eq!(f.status, FeatStatus::Proposal);
        assert!(f.current_task_id.is_none());
    }

    #[test]
    fn counters_default_when_absent() {
        let f = Feat::new("f-20250101-a", "A", "a", "", "main");
        let mut yaml: serde_yaml::Value = serde_yaml::to_value(&f).unwrap();
        yaml.as_mapping_mut().unwrap().remove("counters");
        let back: Feat = serde_yaml::from_value(yaml).unwrap();
        assert_eq!(back.counters, Counters::default());
    }

    #[test]
    fn create_feat_scaffolds_everything() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        init(dir.path()).unwrap();

        let (feat, tasks) = create_feat(
            dir.path(),
            &CreateFeat {
                title: "Login Fix",
                slug: None,
                goal: "users can log in",
                first_task: None,
            },
        )
        .unwrap();

        assert!(feat.feat_id.ends_with("-login-fix"));
        assert_eq!(feat.base_ref, "main");
        assert_eq!(tasks.tasks.len(), 1);
        assert_eq!(tasks.tasks[0].id, "T-001");
        assert_eq!(feat.history[0].action, "feat_created");
        assert_eq!(feat.history[0].detail, "base_ref=main");

        assert!(dir.path().join(&feat.worktree_path).is_dir());
        assert!(Git::new(dir.path()).branch_exists(&feat.branch).unwrap());
        let fdir = paths::feat_dir(dir.path(), &feat.feat_id, FeatStatus::Proposal);
        assert!(fdir.join(paths::PROPOSAL_FILE).exists());
        assert!(fdir.join(paths::UI_EVIDENCE_FILE).exists());
        assert!(fdir.join(paths::CHECKLIST_FILE).exists());

        let (loaded, _) = Store::new(dir.path()).load(&feat.feat_id).unwrap();
        assert_eq!(loaded.status, FeatStatus::Proposal);
    }

    #[test]
    fn duplicate_titles_get_suffixes() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        init(dir.path()).unwrap();
        let req = CreateFeat {
            title: "Login Fix",
            slug: None,
            goal: "",
            first_task: None,
        };
        let (a, _) = create_feat(dir.path(), &req).unwrap();
        let (b, _) = create_feat(dir.path(), &req).unwrap();
        assert_eq!(b.feat_id, format!("{}-2", a.feat_id));
    }

    #[test]
    fn failed_scaffold_leaves_no_branch_or_worktree() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        init(dir.path()).unwrap();
        let feats = paths::active_feats_dir(dir.path());
        std::fs::remove_dir_all(&feats).unwrap();
        std::fs::write(&feats, "not a directory").unwrap();

        let req = CreateFeat {
            title: "Login Fix",
            slug: None,
            goal: "",
            first_task: None,
        };
        assert!(create_feat(dir.path(), &req).is_err());

        let git = Git::new(dir.path());
        let id = allocate_feat_id(dir.path(), &Index::load(dir.path()).unwrap(), "login-fix");
        let expected = Feat::new(&id, "Login Fix", "login-fix", "", "main");
        assert!(!git.branch_exists(&expected.branch).unwrap());
        assert!(!dir.path().join(&expected.worktree_path).exists());
        assert!(Index::load(dir.path()).unwrap().feats.is_empty());

        std::fs::remove_file(&feats).unwrap();
        std::fs::create_dir(&feats).unwrap();
        let (feat, _) = create_feat(dir.path(), &req).unwrap();
        assert_eq!(feat.feat_id, id);
    }

    #[test]
    fn empty_slug_is_rejected() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        init(dir.path()).unwrap();
        let err = create_feat(
            dir.path(),
            &CreateFeat {
                title: "???",
                slug: None,
                goal: "",
                first_task: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Usage);
    }
}
