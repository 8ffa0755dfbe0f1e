use crate::error::{HarnessError, Result};
use crate::types::FeatStatus;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const HARNESS_DIR: &str = ".harness";
pub const FEATS_DIR: &str = ".harness/feats";
pub const FEATS_ARCHIVED_DIR: &str = ".harness/feats-archived";
pub const INDEX_DIR: &str = ".harness/index";
pub const ARTIFACTS_DIR: &str = ".harness/artifacts";
pub const WORKTREES_DIR: &str = ".worktrees";
pub const NOTES_INBOX_DIR: &str = "docs/notes/inbox";

pub const INDEX_FILE: &str = ".harness/index/feats.yaml";
pub const CONFIG_FILE: &str = ".harness/config.yaml";
pub const READINESS_REPORT_FILE: &str = ".harness/artifacts/ref-read-report.json";

pub const STATE_FILE: &str = "state.yaml";
pub const TASKS_FILE: &str = "tasks.yaml";
pub const CHECKLIST_FILE: &str = "tasks.md";
pub const SUMMARY_FILE: &str = "summary.md";
pub const PROPOSAL_FILE: &str = "proposal.md";
pub const UI_EVIDENCE_FILE: &str = "gate/ui-verification.md";
pub const FEAT_ARTIFACTS_DIR: &str = "artifacts";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn harness_dir(root: &Path) -> PathBuf {
    root.join(HARNESS_DIR)
}

pub fn index_path(root: &Path) -> PathBuf {
    root.join(INDEX_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn readiness_report_path(root: &Path) -> PathBuf {
    root.join(READINESS_REPORT_FILE)
}

pub fn active_feats_dir(root: &Path) -> PathBuf {
    root.join(FEATS_DIR)
}

pub fn archived_feats_dir(root: &Path) -> PathBuf {
    root.join(FEATS_ARCHIVED_DIR)
}

/// Directory holding a feat's documents for the given status. Archived feats
/// live in the archived store; every other status lives in the active store.
pub fn feat_dir(root: &Path, feat_id: &str, status: FeatStatus) -> PathBuf {
    let base = if status == FeatStatus::Archived {
        archived_feats_dir(root)
    } else {
        active_feats_dir(root)
    };
    base.join(feat_id)
}

pub fn state_path(root: &Path, feat_id: &str, status: FeatStatus) -> PathBuf {
    feat_dir(root, feat_id, status).join(STATE_FILE)
}

pub fn tasks_path(root: &Path, feat_id: &str, status: FeatStatus) -> PathBuf {
    feat_dir(root, feat_id, status).join(TASKS_FILE)
}

pub fn summary_path(root: &Path, feat_id: &str) -> PathBuf {
    feat_dir(root, feat_id, FeatStatus::Archived).join(SUMMARY_FILE)
}

pub fn branch_name(feat_id: &str) -> String {
    format!("feat/{feat_id}")
}

pub fn worktree_name(feat_id: &str) -> String {
    format!("wt-{feat_id}")
}

/// Worktree path relative to the project root.
pub fn worktree_rel(feat_id: &str) -> PathBuf {
    Path::new(WORKTREES_DIR).join(worktree_name(feat_id))
}

/// Resolve a stored worktree path (relative or absolute) against the root.
pub fn resolve_worktree(root: &Path, raw: &str) -> PathBuf {
    let p = Path::new(raw);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static FEAT_ID_RE: OnceLock<Regex> = OnceLock::new();
static TASK_ID_RE: OnceLock<Regex> = OnceLock::new();

pub(crate) const FEAT_ID_PATTERN: &str = r"f-\d{8}-[a-z0-9][a-z0-9-]*";
pub(crate) const TASK_ID_PATTERN: &str = r"T-\d{3}";

fn feat_id_re() -> &'static Regex {
    FEAT_ID_RE.get_or_init(|| {
        Regex::new(&format!("^{FEAT_ID_PATTERN}$")).expect("feat id pattern compiles")
    })
}

fn task_id_re() -> &'static Regex {
    TASK_ID_RE.get_or_init(|| {
        Regex::new(&format!("^{TASK_ID_PATTERN}$")).expect("task id pattern compiles")
    })
}

pub fn is_valid_feat_id(id: &str) -> bool {
    feat_id_re().is_match(id)
}

pub fn is_valid_task_id(id: &str) -> bool {
    task_id_re().is_match(id)
}

pub fn validate_feat_id(id: &str) -> Result<()> {
    if !is_valid_feat_id(id) {
        return Err(HarnessError::InvalidFeatId(id.to_string()));
    }
    Ok(())
}

pub fn validate_task_id(id: &str) -> Result<()> {
    if !is_valid_task_id(id) {
        return Err(HarnessError::InvalidTaskId(id.to_string()));
    }
    Ok(())
}

/// Lowercase, collapse every run of non `[a-z0-9]` characters to a single
/// dash, and trim dashes from both ends.
pub fn slugify(value: &str) -> Result<String> {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return Err(HarnessError::InvalidSlug(value.to_string()));
    }
    Ok(slug)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
