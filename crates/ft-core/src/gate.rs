use crate::config::Config;
use crate::detect::{self, CommandDetector, ToolProbe, WhichProbe};
use crate::error::{HarnessError, Result};
use crate::feat::{Counters, Feat, GateSnapshot};
use crate::io;
use crate::paths;
use crate::store::Store;
use crate::task::TaskList;
use crate::types::{GateOutcome, ProjectType, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Outcome of one verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub exit_code: i32,
    pub status: GateOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub feat_id: String,
    pub task_id: String,
    pub project_type: ProjectType,
    pub result: GateOutcome,
    pub reasons: Vec<String>,
    pub commands: Vec<CommandRecord>,
    /// Relative to the project root.
    pub log_path: String,
    pub counters: Counters,
    pub checked_at: DateTime<Utc>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.result.is_pass()
    }

    /// `Err(GateFailed)` for a failing run. The run itself is already
    /// persisted either way.
    pub fn into_result(self) -> Result<GateReport> {
        if self.passed() {
            Ok(self)
        } else {
            Err(HarnessError::GateFailed {
                feat: self.feat_id,
                task: self.task_id,
                reasons: self.reasons,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Shell execution
// ---------------------------------------------------------------------------

const MAX_OUTPUT: usize = 10 * 1024;

struct ShellOutcome {
    exit_code: i32,
    output: String,
}

/// Run `command` via `sh -c` in `cwd`, no timeout. Output is capped to the
/// last 10KB.
fn run_shell(command: &str, cwd: &Path) -> ShellOutcome {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();
    match output {
        Ok(out) => ShellOutcome {
            exit_code: out.status.code().unwrap_or(-1),
            output: cap_output(
                &String::from_utf8_lossy(&out.stdout),
                &String::from_utf8_lossy(&out.stderr),
            ),
        },
        Err(e) => ShellOutcome {
            exit_code: -1,
            output: format!("failed to spawn: {e}"),
        },
    }
}

fn cap_output(stdout: &str, stderr: &str) -> String {
    let combined = if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else {
        format!("{stdout}\n{stderr}")
    };
    let trimmed = combined.trim();
    if trimmed.len() <= MAX_OUTPUT {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX_OUTPUT;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

// ---------------------------------------------------------------------------
// UI evidence
// ---------------------------------------------------------------------------

pub const UI_EVIDENCE_HEADINGS: [&str; 3] =
    ["## Critical Paths", "## Screenshots", "## Console Errors"];

/// Problems with the UI evidence document; empty when it is acceptable.
pub fn check_ui_evidence(path: &Path) -> Vec<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return vec![format!("missing UI verification file: {}", path.display())],
    };
    let mut errors: Vec<String> = UI_EVIDENCE_HEADINGS
        .iter()
        .filter(|h| !text.contains(*h))
        .map(|h| format!("missing heading in UI evidence: {h}"))
        .collect();
    if !text.to_lowercase().contains("console errors: none") {
        errors.push("UI evidence must declare 'Console Errors: none'".to_string());
    }
    errors
}

// ---------------------------------------------------------------------------
// GateRunner
// ---------------------------------------------------------------------------

pub struct GateRunner {
    detectors: Vec<Box<dyn CommandDetector>>,
    probe: Box<dyn ToolProbe>,
}

impl Default for GateRunner {
    fn default() -> Self {
        Self {
            detectors: detect::default_detectors(),
            probe: Box::new(WhichProbe),
        }
    }
}

struct Execution {
    records: Vec<CommandRecord>,
    reasons: Vec<String>,
    transcript: String,
}

impl GateRunner {
    pub fn new(detectors: Vec<Box<dyn CommandDetector>>, probe: Box<dyn ToolProbe>) -> Self {
        Self { detectors, probe }
    }

    /// Run the gate for the in_progress task and persist the outcome. A
    /// failing gate is still `Ok`; see [`GateReport::into_result`].
    pub fn run(&self, root: &Path, feat_id: &str, task_id: &str) -> Result<GateReport> {
        paths::validate_task_id(task_id)?;
        let store = Store::new(root);
        let (mut feat, mut tasks) = store.load(feat_id)?;
        check_preconditions(&feat, &tasks, task_id)?;

        let config = Config::load(root)?;
        let project_type = config.gate.resolve_project_type(root);
        let feat_dir = store.location(feat_id)?;

        let mut reasons = Vec::new();
        let execution = match project_type {
            ProjectType::Ui => {
                reasons.extend(check_ui_evidence(&feat_dir.join(paths::UI_EVIDENCE_FILE)));
                execute(root, &config.gate.ui_commands, "ui command failed")
            }
            ProjectType::NonUi => {
                let commands = if config.gate.non_ui_commands.is_empty() {
                    detect::detect_commands(root, &self.detectors, self.probe.as_ref())
                } else {
                    config.gate.non_ui_commands.clone()
                };
                if commands.is_empty() {
                    reasons.push(format!(
                        "no non-ui gate command available; set gate.non_ui_commands in {}",
                        paths::CONFIG_FILE
                    ));
                }
                execute(root, &commands, "command failed")
            }
        };
        reasons.extend(execution.reasons);
        let result = GateOutcome::from_passed(reasons.is_empty());
        let now = Utc::now();

        let log = render_log(now, project_type, result, &reasons, &execution.records, &execution.transcript);
        let log_name = format!("gate-{}.log", now.format("%Y%m%dT%H%M%S%.6fZ"));
        let log_abs = io::write_new(
            &feat_dir.join(paths::FEAT_ARTIFACTS_DIR).join(log_name),
            log.as_bytes(),
        )?;
        let log_rel = relative(root, &log_abs);

        apply_outcome(&mut feat, &mut tasks, task_id, result, &execution.records, &log_rel, now)?;
        store.save(&mut feat, &mut tasks)?;

        Ok(GateReport {
            feat_id: feat_id.to_string(),
            task_id: task_id.to_string(),
            project_type,
            result,
            reasons,
            commands: execution.records,
            log_path: log_rel,
            counters: feat.counters,
            checked_at: now,
        })
    }
}

fn check_preconditions(feat: &Feat, tasks: &TaskList, task_id: &str) -> Result<()> {
    let task = tasks.find(task_id)?;
    if task.status != TaskStatus::InProgress {
        return Err(HarnessError::invariant(format!(
            "task {task_id} must be in_progress before gate (is {})",
            task.status
        )));
    }
    if feat.current_task_id.as_deref() != Some(task_id) {
        return Err(HarnessError::invariant(format!(
            "feat current_task_id ({}) does not match task {task_id}",
            feat.current_task_id.as_deref().unwrap_or("<none>")
        )));
    }
    Ok(())
}

/// Runs every command, even after a failure, so the report is complete.
fn execute(root: &Path, commands: &[String], failure_prefix: &str) -> Execution {
    let mut records = Vec::new();
    let mut reasons = Vec::new();
    let mut transcript = String::new();
    for cmd in commands {
        debug!(command = %cmd, "gate command start");
        let outcome = run_shell(cmd, root);
        let status = GateOutcome::from_passed(outcome.exit_code == 0);
        debug!(command = %cmd, exit_code = outcome.exit_code, "gate command finished");
        if !status.is_pass() {
            reasons.push(format!("{failure_prefix}: {cmd}"));
        }
        let _ = writeln!(transcript, "$ {cmd}\n{}\n", outcome.output);
        records.push(CommandRecord {
            command: cmd.clone(),
            exit_code: outcome.exit_code,
            status,
        });
    }
    Execution {
        records,
        reasons,
        transcript,
    }
}

/// Counters, snapshots and history for one run. Every run is a round without
/// progress; only finishing a task resets that counter.
pub(crate) fn apply_outcome(
    feat: &mut Feat,
    tasks: &mut TaskList,
    task_id: &str,
    result: GateOutcome,
    records: &[CommandRecord],
    log_path: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let c = &mut feat.counters;
    c.round_count += 1;
    c.no_progress_rounds += 1;
    c.gate_fail_streak = if result.is_pass() {
        0
    } else {
        c.gate_fail_streak + 1
    };

    feat.gate = GateSnapshot {
        last_result: Some(result),
        last_task_id: Some(task_id.to_string()),
        last_checked_at: Some(at),
        last_check_commands: records.to_vec(),
        last_log_path: Some(log_path.to_string()),
    };
    feat.record("task_gate", format!("{task_id} => {result}"));

    let task = tasks.find_mut(task_id)?;
    task.gate_result = Some(result);
    task.last_gate_at = Some(at);
    task.last_gate_commands = records.to_vec();
    Ok(())
}

fn render_log(
    at: DateTime<Utc>,
    project_type: ProjectType,
    result: GateOutcome,
    reasons: &[String],
    records: &[CommandRecord],
    transcript: &str,
) -> String {
    let mut out = format!(
        "gate_time={}\nproject_type={project_type}\nresult={result}\n",
        at.to_rfc3339()
    );
    if !reasons.is_empty() {
        out.push_str("reasons:\n");
        for r in reasons {
            let _ = writeln!(out, "- {r}");
        }
    }
    out.push_str("commands:\n");
    for rec in records {
        let _ = writeln!(out, "- {} => {} ({})", rec.command, rec.status, rec.exit_code);
    }
    if !transcript.is_empty() {
        out.push_str("output:\n");
        out.push_str(transcript);
    }
    out
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Run the gate with the default detectors and PATH lookup.
pub fn run_gate(root: &Path, feat_id: &str, task_id: &str) -> Result<GateReport> {
    GateRunner::default().run(root, feat_id, task_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
