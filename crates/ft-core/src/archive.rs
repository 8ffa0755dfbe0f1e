use crate::error::{HarnessError, Result};
use crate::feat::{CleanupRecord, Feat};
use crate::git::Git;
use crate::io;
use crate::paths;
use crate::store::Store;
use crate::task::{TaskList, TaskStats};
use crate::types::FeatStatus;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CLEANUP_NOTE: &str = "worktree removed; branch deleted only when merged into base";

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub feat_id: String,
    pub closed_from_status: Option<FeatStatus>,
    pub cleanup: CleanupRecord,
    /// False when the feat was already in the archived store.
    pub moved: bool,
    pub summary_path: PathBuf,
    pub notes: Vec<PathBuf>,
}

/// Terminal transition. Every check runs before the first destructive step:
/// status, merge state for done feats, a clean worktree, and a free slot in
/// the archived store. Then: remove worktree, delete the branch if merged,
/// move the directory, write the summary, save as archived.
///
/// Re-running on an archived feat does not move anything but rewrites the
/// summary.
pub fn archive_feat(root: &Path, feat_id: &str) -> Result<ArchiveReport> {
    let git = Git::new(root);
    git.ensure_repo()?;
    let store = Store::new(root);
    let (mut feat, mut tasks) = store.load(feat_id)?;
    let current = feat.status;

    if !current.is_closable() {
        return Err(HarnessError::InvalidTransition {
            from: current.to_string(),
            to: FeatStatus::Archived.to_string(),
            reason: "feat must be done or blocked before archive".into(),
        });
    }

    let base_ref = if feat.base_ref.is_empty() {
        git.pick_base_branch()?
    } else {
        feat.base_ref.clone()
    };
    let branch_exists = !feat.branch.is_empty() && git.branch_exists(&feat.branch)?;
    let branch_merged = branch_exists && git.is_ancestor(&feat.branch, &base_ref)?;
    if current == FeatStatus::Done && !branch_merged {
        return Err(HarnessError::invariant(format!(
            "feat is done but branch {} is not merged into {base_ref}; merge it or finish the feat blocked",
            feat.branch
        )));
    }

    let worktree = (!feat.worktree_path.is_empty())
        .then(|| paths::resolve_worktree(root, &feat.worktree_path))
        .filter(|p| p.exists());
    if let Some(wt) = &worktree {
        let dirty = git.status_porcelain(wt)?;
        if !dirty.is_empty() {
            return Err(HarnessError::invariant(format!(
                "worktree has {} uncommitted change(s): {}",
                dirty.len(),
                wt.display()
            )));
        }
    }

    let src = paths::feat_dir(root, feat_id, current);
    let dst = paths::feat_dir(root, feat_id, FeatStatus::Archived);
    let relocate = current != FeatStatus::Archived;
    if relocate {
        if !src.is_dir() {
            return Err(HarnessError::DocumentMissing(src));
        }
        if dst.exists() {
            return Err(HarnessError::invariant(format!(
                "archived feat directory already exists: {}",
                dst.display()
            )));
        }
    }

    // Destructive steps. A checked-out branch cannot be deleted, so the
    // worktree goes first.
    let mut worktree_removed = false;
    if let Some(wt) = &worktree {
        git.worktree_remove(wt)?;
        worktree_removed = true;
        info!(feat = %feat_id, worktree = %wt.display(), "removed worktree");
    }

    let mut branch_deleted = false;
    if branch_exists && branch_merged {
        git.delete_branch(&feat.branch)?;
        branch_deleted = true;
        info!(feat = %feat_id, branch = %feat.branch, "deleted merged branch");
    }

    if relocate {
        io::ensure_dir(&paths::archived_feats_dir(root))?;
        std::fs::rename(&src, &dst)?;
        info!(feat = %feat_id, to = %dst.display(), "moved feat to archived store");
        feat.closed_from_status = Some(current);
    }

    let observed = CleanupRecord {
        base_ref,
        branch_merged,
        worktree_removed,
        branch_deleted,
        note: CLEANUP_NOTE.to_string(),
    };
    // A re-run only adds outcomes; what the first archival did stays recorded.
    let cleanup = match feat.archived_cleanup.take() {
        Some(prev) if !relocate => CleanupRecord {
            base_ref: prev.base_ref,
            branch_merged: prev.branch_merged || observed.branch_merged,
            worktree_removed: prev.worktree_removed || observed.worktree_removed,
            branch_deleted: prev.branch_deleted || observed.branch_deleted,
            note: prev.note,
        },
        _ => observed,
    };
    feat.status = FeatStatus::Archived;
    feat.archived_at.get_or_insert_with(Utc::now);
    feat.archived_cleanup = Some(cleanup.clone());
    feat.record("feat_archived", if relocate { "moved + cleaned" } else { "re-archived" });

    let summary_path = paths::summary_path(root, feat_id);
    io::atomic_write(&summary_path, render_summary(&feat, &tasks).as_bytes())?;

    let notes = emit_notes(root, &feat);
    store.save(&mut feat, &mut tasks)?;

    Ok(ArchiveReport {
        feat_id: feat_id.to_string(),
        closed_from_status: feat.closed_from_status,
        cleanup,
        moved: relocate,
        summary_path,
        notes,
    })
}

pub fn render_summary(feat: &Feat, tasks: &TaskList) -> String {
    let stats = TaskStats::of(&tasks.tasks);
    let cleanup = feat.archived_cleanup.as_ref();
    let flag = |f: fn(&CleanupRecord) -> bool| cleanup.map(|c| f(c).to_string()).unwrap_or_default();
    let c = &feat.counters;
    let archived_at = feat.archived_at.unwrap_or_else(Utc::now).to_rfc3339();

    let lines = [
        format!("# Feat Summary: {}", feat.feat_id),
        String::new(),
        format!("- Title: {}", feat.title),
        format!("- Goal: {}", feat.goal),
        format!("- Final Status: {}", feat.status),
        format!(
            "- Closed From Status: {}",
            feat.closed_from_status.map(|s| s.to_string()).unwrap_or_default()
        ),
        format!("- Base Ref: {}", feat.base_ref),
        format!("- Branch: {}", feat.branch),
        format!("- Worktree: {}", feat.worktree_path),
        format!("- Archived At (UTC): {archived_at}"),
        String::new(),
        "## Archive Cleanup".to_string(),
        format!("- Branch Merged: {}", flag(|c| c.branch_merged)),
        format!("- Worktree Removed: {}", flag(|c| c.worktree_removed)),
        format!("- Branch Deleted: {}", flag(|c| c.branch_deleted)),
        format!(
            "- Cleanup Note: {}",
            cleanup.map(|c| c.note.as_str()).unwrap_or_default()
        ),
        String::new(),
        "## Task Stats".to_string(),
        format!("- todo: {}", stats.todo),
        format!("- in_progress: {}", stats.in_progress),
        format!("- done: {}", stats.done),
        format!("- blocked: {}", stats.blocked),
        String::new(),
        "## Counters".to_string(),
        format!("- gate_fail_streak: {}", c.gate_fail_streak),
        format!("- no_progress_rounds: {}", c.no_progress_rounds),
        format!("- round_count: {}", c.round_count),
        String::new(),
        "## Notes".to_string(),
        "- Promote durable decisions and gotchas to the notes inbox when applicable.".to_string(),
        String::new(),
    ];
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Durable notes side channel
// ---------------------------------------------------------------------------

const DECISION_TEMPLATE: &str = "\
# Decision: <feat-id>

- Created: <created-at>
- Feat: <feat-id> (<title>)
- Closed from: <closed-from>

## Context

<goal>

## Decision

-

## Consequences

-
";

const HOWTO_TEMPLATE: &str = "\
# How-to: result of <feat-id>

- Created: <created-at>
- Branch: <branch> (base <base-ref>)

## Steps

-

## Verification

- Gate rounds: <round-count>
";

const GOTCHA_TEMPLATE: &str = "\
# Gotcha: <feat-id>

- Created: <created-at>
- Closed from: <closed-from>
- Gate fail streak at close: <fail-streak>

## What went wrong

-

## How to avoid it

-
";

fn fill(template: &str, feat: &Feat) -> String {
    let closed = feat
        .closed_from_status
        .map(|s| s.to_string())
        .unwrap_or_default();
    [
        ("<feat-id>", feat.feat_id.clone()),
        ("<created-at>", Utc::now().to_rfc3339()),
        ("<title>", feat.title.clone()),
        ("<goal>", feat.goal.clone()),
        ("<closed-from>", closed),
        ("<branch>", feat.branch.clone()),
        ("<base-ref>", feat.base_ref.clone()),
        ("<round-count>", feat.counters.round_count.to_string()),
        ("<fail-streak>", feat.counters.gate_fail_streak.to_string()),
    ]
    .iter()
    .fold(template.to_string(), |acc, (k, v)| acc.replace(k, v))
}

/// Best effort: failures are logged, never returned.
fn emit_notes(root: &Path, feat: &Feat) -> Vec<PathBuf> {
    let inbox = root.join(paths::NOTES_INBOX_DIR);
    if !inbox.is_dir() {
        return Vec::new();
    }
    let id = &feat.feat_id;
    let mut notes = vec![
        (inbox.join(format!("decision-{id}.md")), DECISION_TEMPLATE),
        (inbox.join(format!("howto-{id}-result.md")), HOWTO_TEMPLATE),
    ];
    if feat.closed_from_status == Some(FeatStatus::Blocked) || feat.counters.gate_fail_streak > 0 {
        notes.push((inbox.join(format!("gotcha-{id}.md")), GOTCHA_TEMPLATE));
    }

    let mut written = Vec::new();
    for (path, template) in notes {
        match io::atomic_write(&path, fill(template, feat).as_bytes()) {
            Ok(()) => written.push(path),
            Err(e) => warn!(path = %path.display(), error = %e, "could not write note"),
        }
    }
    written
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
