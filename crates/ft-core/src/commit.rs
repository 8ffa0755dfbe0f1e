//! Structured commit messages binding a task outcome to its gate evidence.
//!
//! ```text
//! feat(<feat_id>): task(<task_id>) <summary>
//!
//! Plan:
//! - Feat Goal: <goal>
//! - Task: <title>
//!
//! Check:
//! - `<command>` => PASS
//!
//! Learn:
//! - ...
//!
//! Feat-ID: <feat_id>
//! Task-ID: <task_id>
//! Gate-Result: pass|fail
//! Task-Status: done|blocked
//! ```

use crate::error::{HarnessError, Result};
use crate::feat::Feat;
use crate::git::Git;
use crate::io;
use crate::paths::{self, FEAT_ID_PATTERN, TASK_ID_PATTERN};
use crate::store::Store;
use crate::task::Task;
use crate::types::{FinishResult, GateOutcome, TaskStatus};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

pub const SECTIONS: [&str; 3] = ["Plan:", "Check:", "Learn:"];
pub const TRAILER_KEYS: [&str; 4] = ["Feat-ID", "Task-ID", "Gate-Result", "Task-Status"];

const NO_RECORDS: &str = "- No gate command records found";
const LEARN_PLACEHOLDER: &str = "- Add key learnings, risks, or follow-up notes here.";

static SUBJECT_RE: OnceLock<Regex> = OnceLock::new();
static TRAILER_RE: OnceLock<Regex> = OnceLock::new();

fn subject_re() -> &'static Regex {
    SUBJECT_RE.get_or_init(|| {
        Regex::new(&format!(
            r"^feat\(({FEAT_ID_PATTERN})\): task\(({TASK_ID_PATTERN})\) .+$"
        ))
        .expect("subject pattern compiles")
    })
}

fn trailer_re() -> &'static Regex {
    TRAILER_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9-]+):\s*(.+)$").expect("trailer pattern compiles")
    })
}

/// Values a message must carry to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected<'a> {
    pub feat_id: &'a str,
    pub task_id: &'a str,
    pub task_status: &'a str,
    pub gate_result: &'a str,
}

pub fn build_message(
    feat: &Feat,
    task: &Task,
    summary: &str,
    task_status: FinishResult,
    gate_result: GateOutcome,
) -> String {
    let checks: Vec<String> = if task.last_gate_commands.is_empty() {
        vec![NO_RECORDS.to_string()]
    } else {
        task.last_gate_commands
            .iter()
            .map(|r| {
                format!(
                    "- `{}` => {}",
                    r.command,
                    r.status.as_str().to_uppercase()
                )
            })
            .collect()
    };

    let mut lines = vec![
        format!("feat({}): task({}) {}", feat.feat_id, task.id, summary),
        String::new(),
        "Plan:".to_string(),
        format!("- Feat Goal: {}", feat.goal),
        format!("- Task: {}", task.title),
        String::new(),
        "Check:".to_string(),
    ];
    lines.extend(checks);
    lines.extend([
        String::new(),
        "Learn:".to_string(),
        LEARN_PLACEHOLDER.to_string(),
        String::new(),
        format!("Feat-ID: {}", feat.feat_id),
        format!("Task-ID: {}", task.id),
        format!("Gate-Result: {gate_result}"),
        format!("Task-Status: {task_status}"),
        String::new(),
    ]);
    lines.join("\n")
}

/// Every `Key: value` line; a later occurrence of a key wins.
pub fn parse_trailers(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let caps = trailer_re().captures(line.trim())?;
            Some((caps[1].to_string(), caps[2].to_string()))
        })
        .collect()
}

/// All problems with `text` against `expected`; empty when valid.
pub fn validate_message(text: &str, expected: &Expected<'_>) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let Some(first) = lines.first() else {
        return vec!["empty commit message".to_string()];
    };

    let mut errors = Vec::new();
    match subject_re().captures(first.trim()) {
        None => errors.push("invalid subject format".to_string()),
        Some(caps) => {
            if &caps[1] != expected.feat_id {
                errors.push("subject feat-id mismatch".to_string());
            }
            if &caps[2] != expected.task_id {
                errors.push("subject task-id mismatch".to_string());
            }
        }
    }

    let padded = format!("\n{}\n", lines.join("\n"));
    for section in SECTIONS {
        if !padded.contains(&format!("\n{section}\n")) {
            errors.push(format!("missing section: {section}"));
        }
    }

    let trailers = parse_trailers(text);
    let wanted = [
        expected.feat_id,
        expected.task_id,
        expected.gate_result,
        expected.task_status,
    ];
    for (key, value) in TRAILER_KEYS.iter().zip(wanted) {
        if trailers.get(*key).map(String::as_str) != Some(value) {
            errors.push(format!("missing or invalid trailer {key}"));
        }
    }

    if expected.task_status == TaskStatus::Done.as_str()
        && expected.gate_result != GateOutcome::Pass.as_str()
    {
        errors.push("done status requires gate_result=pass".to_string());
    }
    errors
}

/// What the auditor expects of a task's recorded commit: the task's own
/// status once terminal (else `done`), and its gate result (else `pass`).
pub fn audit_expectation(
    status: TaskStatus,
    gate_result: Option<GateOutcome>,
) -> (&'static str, &'static str) {
    let status = match status {
        TaskStatus::Done | TaskStatus::Blocked => status.as_str(),
        _ => TaskStatus::Done.as_str(),
    };
    (status, gate_result.unwrap_or(GateOutcome::Pass).as_str())
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommitRequest<'a> {
    pub summary: Option<&'a str>,
    pub task_status: FinishResult,
    pub message_out: Option<&'a Path>,
    pub execute: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparedCommit {
    pub message_file: PathBuf,
    pub message: String,
    /// Directory the commit runs in: the feat's worktree when present.
    pub workdir: PathBuf,
    pub commit_hash: Option<String>,
}

impl PreparedCommit {
    pub fn suggested_command(&self) -> String {
        format!(
            "git -C {} add -A && git -C {} commit -F {}",
            self.workdir.display(),
            self.workdir.display(),
            self.message_file.display()
        )
    }
}

pub fn prepare_commit(
    root: &Path,
    feat_id: &str,
    task_id: &str,
    req: &CommitRequest<'_>,
) -> Result<PreparedCommit> {
    paths::validate_task_id(task_id)?;
    let store = Store::new(root);
    let (mut feat, mut tasks) = store.load(feat_id)?;
    let task = tasks.find(task_id)?;

    if task.status != TaskStatus::InProgress {
        return Err(HarnessError::invariant(format!(
            "task must be in_progress before commit: {task_id}"
        )));
    }
    let Some(gate_result) = task.gate_result else {
        return Err(HarnessError::invariant(format!(
            "task {task_id} has no gate result; run the gate first"
        )));
    };
    if req.task_status == FinishResult::Done && !gate_result.is_pass() {
        return Err(HarnessError::invariant(
            "Task-Status done requires Gate-Result pass",
        ));
    }

    let summary = req
        .summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            if task.summary.trim().is_empty() {
                task.title.trim()
            } else {
                task.summary.trim()
            }
        })
        .to_string();
    if summary.is_empty() {
        return Err(HarnessError::Usage("commit summary must not be empty".into()));
    }

    let message = build_message(&feat, task, &summary, req.task_status, gate_result);
    let errors = validate_message(
        &message,
        &Expected {
            feat_id,
            task_id,
            task_status: req.task_status.as_str(),
            gate_result: gate_result.as_str(),
        },
    );
    if !errors.is_empty() {
        return Err(HarnessError::invariant(format!(
            "generated commit message is invalid: {}",
            errors.join("; ")
        )));
    }

    let message_file = match req.message_out {
        Some(p) => {
            io::atomic_write(p, message.as_bytes())?;
            p.to_path_buf()
        }
        None => {
            let name = format!("commit-{task_id}-{}.msg", Utc::now().format("%Y%m%dT%H%M%S%.6fZ"));
            let target = store
                .location(feat_id)?
                .join(paths::FEAT_ARTIFACTS_DIR)
                .join(name);
            io::write_new(&target, message.as_bytes())?
        }
    };

    let worktree = paths::resolve_worktree(root, &feat.worktree_path);
    let workdir = if worktree.is_dir() {
        worktree
    } else {
        root.to_path_buf()
    };

    let mut prepared = PreparedCommit {
        message_file,
        message,
        workdir,
        commit_hash: None,
    };

    if req.execute {
        let hash = Git::new(root).commit_all(&prepared.workdir, &prepared.message_file)?;
        info!(feat = %feat_id, task = %task_id, hash = %hash, "committed task");
        tasks.find_mut(task_id)?.last_commit_hash = Some(hash.clone());
        feat.record("task_commit", format!("{task_id} {hash}"));
        store.save(&mut feat, &mut tasks)?;
        prepared.commit_hash = Some(hash);
    }
    Ok(prepared)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::CommandRecord;
    use proptest::prelude::*;

    fn sample(goal: &str, title: &str) -> (Feat, Task) {
        let feat = Feat::new("f-20250101-login-fix", "Login fix", "login-fix", goal, "main");
        let mut task = Task::new("T-001", title);
        task.last_gate_commands = vec![
            CommandRecord {
                command: "cargo test".into(),
                exit_code: 0,
                status: GateOutcome::Pass,
            },
            CommandRecord {
                command: "npm run lint".into(),
                exit_code: 1,
                status: GateOutcome::Fail,
            },
        ];
        (feat, task)
    }

    fn expected<'a>(status: &'a str, gate: &'a str) -> Expected<'a> {
        Expected {
            feat_id: "f-20250101-login-fix",
            task_id: "T-001",
            task_status: status,
            gate_result: gate,
        }
    }

    #[test]
    fn message_layout() {
        let (feat, task) = sample("users can log in", "Fix session cookie");
        let msg = build_message(&feat, &task, "fix cookie", FinishResult::Done, GateOutcome::Pass);
        let expected_text = "\
feat(f-20250101-login-fix): task(T-001) fix cookie

Plan:
- Feat Goal: users can log in
- Task: Fix session cookie

Check:
- `cargo test` => PASS
- `npm run lint` => FAIL

Learn:
- Add key learnings, risks, or follow-up notes here.

Feat-ID: f-20250101-login-fix
Task-ID: T-001
Gate-Result: pass
Task-Status: done
";
        assert_eq!(msg, expected_text);
        assert!(validate_message(&msg, &expected("done", "pass")).is_empty());
    }

    #[test]
    fn placeholder_when_no_records() {
        let (feat, mut task) = sample("", "t");
        task.last_gate_commands.clear();
        let msg = build_message(&feat, &task, "s", FinishResult::Blocked, GateOutcome::Fail);
        assert!(msg.contains("Check:\n- No gate command records found\n"));
        assert!(validate_message(&msg, &expected("blocked", "fail")).is_empty());
    }

    #[test]
    fn reports_each_problem() {
        assert_eq!(
            validate_message("", &expected("done", "pass")),
            vec!["empty commit message"]
        );

        let errors = validate_message(
            "fix stuff\n\nFeat-ID: f-20250101-login-fix\n",
            &expected("done", "pass"),
        );
        assert!(errors.contains(&"invalid subject format".to_string()));
        assert!(errors.contains(&"missing section: Plan:".to_string()));
        assert!(errors.contains(&"missing or invalid trailer Task-ID".to_string()));
        assert!(!errors.contains(&"missing or invalid trailer Feat-ID".to_string()));

        let (feat, task) = sample("g", "t");
        let msg = build_message(&feat, &task, "s", FinishResult::Done, GateOutcome::Pass);
        let errors = validate_message(
            &msg,
            &Expected {
                feat_id: "f-20250101-other",
                task_id: "T-002",
                task_status: "done",
                gate_result: "pass",
            },
        );
        assert!(errors.contains(&"subject feat-id mismatch".to_string()));
        assert!(errors.contains(&"subject task-id mismatch".to_string()));
    }

    #[test]
    fn done_with_failing_gate_is_rejected_even_if_trailers_match() {
        let (feat, task) = sample("g", "t");
        let msg = build_message(&feat, &task, "s", FinishResult::Done, GateOutcome::Fail);
        let errors = validate_message(&msg, &expected("done", "fail"));
        assert_eq!(errors, vec!["done status requires gate_result=pass"]);
    }

    #[test]
    fn trailers_last_occurrence_wins() {
        let t = parse_trailers("Gate-Result: fail\nnot a trailer\nGate-Result:   pass\n");
        assert_eq!(t.get("Gate-Result").map(String::as_str), Some("pass"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn audit_defaults() {
        assert_eq!(audit_expectation(TaskStatus::InProgress, None), ("done", "pass"));
        assert_eq!(
            audit_expectation(TaskStatus::Blocked, Some(GateOutcome::Fail)),
            ("blocked", "fail")
        );
    }

    fn outcome() -> impl Strategy<Value = (FinishResult, GateOutcome)> {
        prop_oneof![
            Just((FinishResult::Done, GateOutcome::Pass)),
            Just((FinishResult::Blocked, GateOutcome::Pass)),
            Just((FinishResult::Blocked, GateOutcome::Fail)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn generated_messages_validate(
            slug in "[a-z0-9][a-z0-9-]{0,20}",
            n in 1u32..999,
            summary in "[A-Za-z0-9][A-Za-z0-9 ,.()-]{0,40}",
            goal in "[A-Za-z0-9 ]{0,30}",
            (status, gate) in outcome(),
        ) {
            let feat_id = format!("f-20250101-{slug}");
            let task_id = format!("T-{n:03}");
            let feat = Feat::new(&feat_id, "t", &slug, goal, "main");
            let task = Task::new(&task_id, "title");
            let msg = build_message(&feat, &task, &summary, status, gate);
            let exp = Expected {
                feat_id: &feat_id,
                task_id: &task_id,
                task_status: status.as_str(),
                gate_result: gate.as_str(),
            };
            prop_assert!(validate_message(&msg, &exp).is_empty());

            for key in TRAILER_KEYS {
                let tampered: String = msg
                    .lines()
                    .map(|l| if l.starts_with(&format!("{key}: ")) {
                        format!("{key}: tampered")
                    } else {
                        l.to_string()
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                prop_assert!(!validate_message(&tampered, &exp).is_empty());
            }
        }
    }
}
