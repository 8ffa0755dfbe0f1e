use crate::commit::{self, Expected};
use crate::config::{Config, StopThresholds};
use crate::error::{HarnessError, Result};
use crate::feat::Feat;
use crate::git::Git;
use crate::paths;
use crate::store::{self, Index};
use crate::task::TaskList;
use crate::types::{FeatStatus, GateOutcome, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub feats_checked: usize,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Err(Inconsistent)` when any violation was found.
    pub fn into_result(self) -> Result<ValidationReport> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(HarnessError::Inconsistent(self.errors.len()))
        }
    }
}

/// Audit every indexed feat plus the on-disk layout. Never stops at the first
/// problem; only a missing `.harness` is an `Err`.
pub fn validate_all(root: &Path) -> Result<ValidationReport> {
    store::ensure_initialized(root)?;
    let mut report = ValidationReport::default();

    if !paths::index_path(root).exists() {
        report
            .errors
            .push(format!("missing index file: {}", paths::INDEX_FILE));
    }
    let index = match Index::load(root) {
        Ok(i) => i,
        Err(e) => {
            report.errors.push(format!("unreadable index: {e}"));
            return Ok(report);
        }
    };

    let mut seen = HashSet::new();
    for entry in &index.feats {
        if !seen.insert(entry.feat_id.as_str()) {
            report
                .errors
                .push(format!("{}: duplicate index entry", entry.feat_id));
        }
    }

    let git = Git::new(root);
    for entry in &index.feats {
        report.feats_checked += 1;
        report
            .errors
            .extend(validate_feat(root, &git, &entry.feat_id, entry.status));
        report
            .errors
            .extend(check_layout(root, &entry.feat_id, entry.status));
    }

    let indexed: BTreeSet<&str> = index.feats.iter().map(|e| e.feat_id.as_str()).collect();
    let (active, archived) = store::feat_dirs(root)?;
    for id in active.iter().filter(|id| !indexed.contains(id.as_str())) {
        report.errors.push(format!("feat directory not indexed: {id}"));
    }
    for id in archived.iter().filter(|id| !indexed.contains(id.as_str())) {
        report
            .errors
            .push(format!("archived feat directory not indexed: {id}"));
    }
    Ok(report)
}

fn check_layout(root: &Path, feat_id: &str, status: FeatStatus) -> Vec<String> {
    let active = paths::feat_dir(root, feat_id, FeatStatus::Ready);
    let archived = paths::feat_dir(root, feat_id, FeatStatus::Archived);
    let mut errors = Vec::new();
    if status == FeatStatus::Archived {
        if active.exists() {
            errors.push(format!(
                "{feat_id}: archived feat dir must not exist in {}/",
                paths::FEATS_DIR
            ));
        }
        if !archived.exists() {
            errors.push(format!("{feat_id}: archived feat dir missing"));
        }
    } else {
        if !active.exists() {
            errors.push(format!("{feat_id}: feat dir missing"));
        }
        if archived.exists() {
            errors.push(format!(
                "{feat_id}: non-archived feat dir must not exist in {}/",
                paths::FEATS_ARCHIVED_DIR
            ));
        }
    }
    errors
}

// Loose views of the two documents. Enum fields stay strings so one value
// outside its set is reported on its own instead of hiding every other check.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateView {
    feat_id: String,
    status: String,
    current_task_id: Option<String>,
    counters: CountersView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CountersView {
    gate_fail_streak: i64,
    no_progress_rounds: i64,
    round_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TasksView {
    feat_id: String,
    tasks: Vec<TaskView>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskView {
    id: String,
    status: String,
    gate_result: Option<String>,
    last_commit_hash: Option<String>,
}

/// A task whose enum fields all parsed.
struct CheckedTask<'a> {
    id: &'a str,
    status: TaskStatus,
    gate_result: Option<GateOutcome>,
    last_commit_hash: Option<&'a str>,
}

fn validate_feat(root: &Path, git: &Git, feat_id: &str, indexed: FeatStatus) -> Vec<String> {
    let mut errors = Vec::new();
    if !paths::is_valid_feat_id(feat_id) {
        errors.push(format!("invalid feat id format: {feat_id}"));
        return errors;
    }

    let dir = paths::feat_dir(root, feat_id, indexed);
    let state_path = dir.join(paths::STATE_FILE);
    let tasks_path = dir.join(paths::TASKS_FILE);
    let feat: StateView = match store::read_yaml(&state_path) {
        Ok(f) => f,
        Err(e) => {
            errors.push(format!("{feat_id}: unreadable state document: {e}"));
            return errors;
        }
    };
    let tasks: TasksView = match store::read_yaml(&tasks_path) {
        Ok(t) => t,
        Err(e) => {
            errors.push(format!("{feat_id}: unreadable tasks document: {e}"));
            return errors;
        }
    };

    let status = match feat.status.parse::<FeatStatus>() {
        Ok(s) => Some(s),
        Err(_) => {
            errors.push(format!("{feat_id}: invalid feat status: {}", feat.status));
            None
        }
    };
    let mut checked = Vec::new();
    let mut unchecked = Vec::new();
    for task in &tasks.tasks {
        let task_status = task.status.parse::<TaskStatus>();
        if task_status.is_err() {
            unchecked.push(task.id.as_str());
            errors.push(format!(
                "{feat_id}/{}: invalid task status: {}",
                task.id, task.status
            ));
        }
        let gate_result = task
            .gate_result
            .as_deref()
            .map(str::parse::<GateOutcome>)
            .transpose();
        if gate_result.is_err() {
            errors.push(format!(
                "{feat_id}/{}: invalid gate result: {}",
                task.id,
                task.gate_result.as_deref().unwrap_or_default()
            ));
        }
        if let (Ok(status), Ok(gate_result)) = (task_status, gate_result) {
            checked.push(CheckedTask {
                id: &task.id,
                status,
                gate_result,
                last_commit_hash: task.last_commit_hash.as_deref(),
            });
        }
    }

    // Enum values are fine; anything else the typed documents reject is a
    // schema problem of its own.
    if errors.is_empty() {
        if let Err(e) = store::read_yaml::<Feat>(&state_path) {
            errors.push(format!("{feat_id}: unreadable state document: {e}"));
        }
        if let Err(e) = store::read_yaml::<TaskList>(&tasks_path) {
            errors.push(format!("{feat_id}: unreadable tasks document: {e}"));
        }
    }

    if feat.feat_id != feat_id {
        errors.push(format!("{feat_id}: state feat_id mismatch ({})", feat.feat_id));
    }
    if tasks.feat_id != feat_id {
        errors.push(format!("{feat_id}: tasks feat_id mismatch ({})", tasks.feat_id));
    }
    if let Some(status) = status.filter(|s| *s != indexed) {
        errors.push(format!(
            "{feat_id}: index status {indexed} does not match state status {status}"
        ));
    }

    let c = &feat.counters;
    for (key, value) in [
        ("gate_fail_streak", c.gate_fail_streak),
        ("no_progress_rounds", c.no_progress_rounds),
        ("round_count", c.round_count),
    ] {
        if value < 0 {
            errors.push(format!("{feat_id}: counter {key} must be >= 0"));
        }
    }

    if tasks.tasks.is_empty() {
        errors.push(format!("{feat_id}: tasks document has no tasks"));
        return errors;
    }

    let mut seen = HashSet::new();
    let mut in_progress = Vec::new();
    for task in &tasks.tasks {
        if !paths::is_valid_task_id(&task.id) {
            errors.push(format!("{feat_id}: invalid task id: {}", task.id));
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("{feat_id}: duplicate task id: {}", task.id));
        }
    }
    for task in &checked {
        if task.status == TaskStatus::InProgress {
            in_progress.push(task.id);
        }
        if task.status == TaskStatus::Done && task.gate_result != Some(GateOutcome::Pass) {
            errors.push(format!(
                "{feat_id}/{}: done without a passing gate result",
                task.id
            ));
        }
    }

    if in_progress.len() > 1 {
        errors.push(format!(
            "{feat_id}: more than one in_progress task: {}",
            in_progress.join(", ")
        ));
    }
    match feat.current_task_id.as_deref() {
        Some(cur) if !in_progress.contains(&cur) && !unchecked.contains(&cur) => errors.push(format!(
            "{feat_id}: current_task_id {cur} does not match an in_progress task"
        )),
        None if !in_progress.is_empty() => errors.push(format!(
            "{feat_id}: task {} is in_progress but current_task_id is unset",
            in_progress[0]
        )),
        _ => {}
    }

    for task in &checked {
        let Some(hash) = task.last_commit_hash.filter(|h| !h.is_empty()) else {
            continue;
        };
        let text = match git.commit_message(hash) {
            Ok(Some(t)) => t,
            _ => {
                errors.push(format!("{feat_id}/{}: commit hash not found: {hash}", task.id));
                continue;
            }
        };
        let (task_status, gate_result) = commit::audit_expectation(task.status, task.gate_result);
        let problems = commit::validate_message(
            &text,
            &Expected {
                feat_id,
                task_id: task.id,
                task_status,
                gate_result,
            },
        );
        if !problems.is_empty() {
            errors.push(format!(
                "{feat_id}/{}: commit message invalid ({})",
                task.id,
                problems.join("; ")
            ));
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Doctor
// ---------------------------------------------------------------------------

pub const NEXT_STEPS: [&str; 3] = [
    "Address threshold warnings before starting the next task.",
    "Run `ft task gate` before every task commit.",
    "Promote notes inbox items after a feat is archived.",
];

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub validation: ValidationReport,
    pub warnings: Vec<String>,
}

/// Validation first; advisory warnings only when it passes.
pub fn doctor(root: &Path) -> Result<DoctorReport> {
    let validation = validate_all(root)?;
    if !validation.is_ok() {
        return Ok(DoctorReport {
            validation,
            warnings: Vec::new(),
        });
    }
    let thresholds = Config::load(root)?.stop_thresholds;
    let index = Index::load(root)?;
    let store = store::Store::new(root);

    let mut warnings = Vec::new();
    for entry in &index.feats {
        let (feat, tasks) = store.load(&entry.feat_id)?;
        warnings.extend(feat_warnings(root, &feat, &tasks, &thresholds));
    }
    Ok(DoctorReport {
        validation,
        warnings,
    })
}

fn feat_warnings(
    root: &Path,
    feat: &Feat,
    tasks: &TaskList,
    limits: &StopThresholds,
) -> Vec<String> {
    let id = &feat.feat_id;
    let c = &feat.counters;
    let mut warnings = Vec::new();
    for (key, value, limit) in [
        ("gate_fail_streak", c.gate_fail_streak, limits.gate_fail_streak),
        ("no_progress_rounds", c.no_progress_rounds, limits.no_progress_rounds),
        ("round_count", c.round_count, limits.max_round_count),
    ] {
        if value >= limit {
            warnings.push(format!("{id}: {key}={value} reached threshold {limit}"));
        }
    }
    if feat.status == FeatStatus::InProgress && tasks.count(TaskStatus::InProgress) == 0 {
        warnings.push(format!("{id}: feat status in_progress but no task in_progress"));
    }
    if feat.status == FeatStatus::Archived && !paths::summary_path(root, id).exists() {
        warnings.push(format!("{id}: archived feat missing summary.md"));
    }
    warnings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::{git, init_repo};
    use crate::lifecycle;
    use crate::store::{init, testing::seed, Store};
    use crate::types::FinishResult;
    use tempfile::TempDir;

    fn setup(ids: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        for id in ids {
            seed(dir.path(), id);
        }
        dir
    }

    fn edit_state(root: &Path, id: &str, f: impl FnOnce(&mut Feat)) {
        let path = root.join(".harness/feats").join(id).join("state.yaml");
        let mut feat: Feat = store::read_yaml(&path).unwrap();
        f(&mut feat);
        std::fs::write(&path, serde_yaml::to_string(&feat).unwrap()).unwrap();
    }

    fn edit_tasks(root: &Path, id: &str, f: impl FnOnce(&mut TaskList)) {
        let path = root.join(".harness/feats").join(id).join("tasks.yaml");
        let mut tasks: TaskList = store::read_yaml(&path).unwrap();
        f(&mut tasks);
        std::fs::write(&path, serde_yaml::to_string(&tasks).unwrap()).unwrap();
    }

    fn edit_raw(root: &Path, id: &str, file: &str, f: impl FnOnce(&mut serde_yaml::Value)) {
        let path = root.join(".harness/feats").join(id).join(file);
        let mut doc: serde_yaml::Value = store::read_yaml(&path).unwrap();
        f(&mut doc);
        std::fs::write(&path, serde_yaml::to_string(&doc).unwrap()).unwrap();
    }

    #[test]
    fn clean_store_passes() {
        let dir = setup(&["f-20250101-a", "f-20250101-b"]);
        let report = validate_all(dir.path()).unwrap();
        assert!(report.is_ok(), "{:?}", report.errors);
        assert_eq!(report.feats_checked, 2);
    }

    #[test]
    fn orphan_directory_reported_alone() {
        let dir = setup(&["f-20250101-a"]);
        std::fs::create_dir_all(dir.path().join(".harness/feats/f-20250101-orphan")).unwrap();
        let report = validate_all(dir.path()).unwrap();
        assert_eq!(
            report.errors,
            vec!["feat directory not indexed: f-20250101-orphan".to_string()]
        );
        assert!(matches!(
            report.into_result().unwrap_err(),
            HarnessError::Inconsistent(1)
        ));
    }

    #[test]
    fn collects_every_violation() {
        let dir = setup(&["f-20250101-a"]);
        edit_tasks(dir.path(), "f-20250101-a", |t| {
            let mut second = t.tasks[0].clone();
            t.tasks[0].status = TaskStatus::InProgress;
            second.status = TaskStatus::InProgress;
            t.tasks.push(second);
        });
        edit_state(dir.path(), "f-20250101-a", |f| {
            f.counters.round_count = -1;
            f.current_task_id = Some("T-009".into());
        });
        let errors = validate_all(dir.path()).unwrap().errors;
        assert!(errors.iter().any(|e| e.contains("duplicate task id: T-001")));
        assert!(errors.iter().any(|e| e.contains("more than one in_progress task")));
        assert!(errors.iter().any(|e| e.contains("counter round_count must be >= 0")));
        assert!(errors.iter().any(|e| e.contains("current_task_id T-009")));
    }

    #[test]
    fn unset_pointer_with_running_task() {
        let dir = setup(&["f-20250101-a"]);
        lifecycle::start_task(dir.path(), "f-20250101-a", "T-001").unwrap();
        edit_state(dir.path(), "f-20250101-a", |f| f.current_task_id = None);
        let errors = validate_all(dir.path()).unwrap().errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("current_task_id is unset"));
    }

    #[test]
    fn invalid_enum_does_not_hide_other_checks() {
        let dir = setup(&["f-20250101-a", "f-20250101-b"]);
        edit_state(dir.path(), "f-20250101-a", |f| f.counters.round_count = -5);
        let path = dir.path().join(".harness/feats/f-20250101-a/tasks.yaml");
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("status: todo", "status: finished")).unwrap();

        let report = validate_all(dir.path()).unwrap();
        assert_eq!(report.feats_checked, 2);
        assert_eq!(
            report.errors,
            vec![
                "f-20250101-a/T-001: invalid task status: finished".to_string(),
                "f-20250101-a: counter round_count must be >= 0".to_string(),
            ]
        );
    }

    #[test]
    fn invalid_feat_status_and_gate_result_reported_per_field() {
        let dir = setup(&["f-20250101-a"]);
        edit_raw(dir.path(), "f-20250101-a", "state.yaml", |doc| {
            doc["status"] = "shipped".into();
        });
        edit_raw(dir.path(), "f-20250101-a", "tasks.yaml", |doc| {
            doc["tasks"][0]["status"] = "done".into();
            doc["tasks"][0]["gate_result"] = "maybe".into();
        });

        let errors = validate_all(dir.path()).unwrap().errors;
        assert!(errors.contains(&"f-20250101-a: invalid feat status: shipped".to_string()));
        assert!(errors.contains(&"f-20250101-a/T-001: invalid gate result: maybe".to_string()));
        assert!(!errors.iter().any(|e| e.contains("unreadable")));
    }

    #[test]
    fn layout_must_follow_status() {
        let dir = setup(&["f-20250101-a"]);
        let mut index = Index::load(dir.path()).unwrap();
        index.feats[0].status = FeatStatus::Archived;
        index.save(dir.path()).unwrap();
        let errors = validate_all(dir.path()).unwrap().errors;
        // state unreadable at the archived location, plus both layout errors.
        assert!(errors.iter().any(|e| e.contains("must not exist in .harness/feats/")));
        assert!(errors.iter().any(|e| e.contains("archived feat dir missing")));
    }

    #[test]
    fn bogus_commit_hash_is_reported() {
        let dir = setup(&["f-20250101-a"]);
        edit_tasks(dir.path(), "f-20250101-a", |t| {
            t.tasks[0].last_commit_hash = Some("deadbeef".into());
        });
        let errors = validate_all(dir.path()).unwrap().errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("commit hash not found: deadbeef"));
    }

    /// Harness store inside a git repo, with one seeded feat.
    fn setup_with_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        init(dir.path()).unwrap();
        seed(dir.path(), "f-20250101-a");
        dir
    }

    #[test]
    fn malformed_commit_message_is_reported() {
        let dir = setup_with_repo();
        git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "wip"]);
        let hash = git(dir.path(), &["rev-parse", "HEAD"]);
        edit_tasks(dir.path(), "f-20250101-a", |t| {
            t.tasks[0].last_commit_hash = Some(hash);
        });

        let errors = validate_all(dir.path()).unwrap().errors;
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0].starts_with("f-20250101-a/T-001: commit message invalid (invalid subject format; "),
            "{}",
            errors[0]
        );
        assert!(errors[0].contains("missing section: Plan:"));
        assert!(errors[0].contains("missing or invalid trailer Feat-ID"));
    }

    #[test]
    fn commit_trailer_disagreeing_with_task_is_reported() {
        let dir = setup_with_repo();
        let store = Store::new(dir.path());
        let (feat, tasks) = store.load("f-20250101-a").unwrap();
        let message = commit::build_message(
            &feat,
            &tasks.tasks[0],
            "give up on login",
            FinishResult::Blocked,
            GateOutcome::Pass,
        );
        let msg_file = dir.path().join("msg.txt");
        std::fs::write(&msg_file, message).unwrap();
        git(dir.path(), &["commit", "-q", "--allow-empty", "-F", "msg.txt"]);
        let hash = git(dir.path(), &["rev-parse", "HEAD"]);
        edit_tasks(dir.path(), "f-20250101-a", |t| {
            t.tasks[0].status = TaskStatus::Done;
            t.tasks[0].gate_result = Some(GateOutcome::Pass);
            t.tasks[0].last_commit_hash = Some(hash);
        });

        let errors = validate_all(dir.path()).unwrap().errors;
        assert_eq!(
            errors,
            vec![
                "f-20250101-a/T-001: commit message invalid (missing or invalid trailer Task-Status)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn doctor_warns_on_thresholds_and_structure() {
        let dir = setup(&["f-20250101-a"]);
        let store = Store::new(dir.path());
        let (mut feat, mut tasks) = store.load("f-20250101-a").unwrap();
        feat.counters.gate_fail_streak = 3;
        feat.counters.round_count = 8;
        feat.status = FeatStatus::InProgress;
        store.save(&mut feat, &mut tasks).unwrap();

        let report = doctor(dir.path()).unwrap();
        assert!(report.validation.is_ok());
        assert!(report
            .warnings
            .contains(&"f-20250101-a: gate_fail_streak=3 reached threshold 3".to_string()));
        assert!(report
            .warnings
            .contains(&"f-20250101-a: round_count=8 reached threshold 8".to_string()));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("in_progress but no task in_progress")));
    }

    #[test]
    fn doctor_stops_when_validation_fails() {
        let dir = setup(&["f-20250101-a"]);
        std::fs::create_dir_all(dir.path().join(".harness/feats-archived/f-20250101-x")).unwrap();
        let report = doctor(dir.path()).unwrap();
        assert!(!report.validation.is_ok());
        assert!(report.warnings.is_empty());
    }
}
