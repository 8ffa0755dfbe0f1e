use crate::output::{print_json, print_list, print_table};
use anyhow::Context;
use clap::Subcommand;
use ft_core::{
    commit::{self, CommitRequest},
    gate,
    lifecycle,
    types::FinishResult,
};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Append a todo task to a feat
    Add {
        #[arg(long = "feat")]
        feat_id: String,
        #[arg(long)]
        title: String,
    },

    /// Move a task to in_progress
    Start {
        #[arg(long = "feat")]
        feat_id: String,
        #[arg(long = "task")]
        task_id: String,
    },

    /// Run the verification gate for the in-progress task
    Gate {
        #[arg(long = "feat")]
        feat_id: String,
        #[arg(long = "task")]
        task_id: String,
    },

    /// Write a structured commit message for the task (and optionally commit)
    Commit {
        #[arg(long = "feat")]
        feat_id: String,
        #[arg(long = "task")]
        task_id: String,
        /// Subject summary (default: the task summary)
        #[arg(long)]
        summary: Option<String>,
        /// Task-Status trailer: done or blocked
        #[arg(long, default_value = "done")]
        task_status: String,
        /// Write the message here instead of the feat artifacts directory
        #[arg(long)]
        message_out: Option<PathBuf>,
        /// Stage everything in the worktree and commit with the message
        #[arg(long)]
        execute: bool,
    },

    /// Finish the in-progress task as done or blocked
    Finish {
        #[arg(long = "feat")]
        feat_id: String,
        #[arg(long = "task")]
        task_id: String,
        /// done or blocked
        #[arg(long)]
        result: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TaskSubcommand::Add { feat_id, title } => add(root, &feat_id, &title, json),
        TaskSubcommand::Start { feat_id, task_id } => start(root, &feat_id, &task_id, json),
        TaskSubcommand::Gate { feat_id, task_id } => run_gate(root, &feat_id, &task_id, json),
        TaskSubcommand::Commit {
            feat_id,
            task_id,
            summary,
            task_status,
            message_out,
            execute,
        } => {
            let task_status: FinishResult = task_status.parse()?;
            prepare_commit(
                root,
                &feat_id,
                &task_id,
                &CommitRequest {
                    summary: summary.as_deref(),
                    task_status,
                    message_out: message_out.as_deref(),
                    execute,
                },
                json,
            )
        }
        TaskSubcommand::Finish {
            feat_id,
            task_id,
            result,
        } => {
            let result: FinishResult = result.parse()?;
            finish(root, &feat_id, &task_id, result, json)
        }
    }
}

// ---------------------------------------------------------------------------
// add / start / finish
// ---------------------------------------------------------------------------

fn add(root: &Path, feat_id: &str, title: &str, json: bool) -> anyhow::Result<()> {
    let (task_id, feat, _) = lifecycle::add_task(root, feat_id, title)
        .with_context(|| format!("failed to add task to '{feat_id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "feat_id": feat_id,
            "task_id": task_id,
            "title": title,
            "feat_status": feat.status,
        }))?;
    } else {
        println!("Added task [{task_id}] to {feat_id}: {title}");
    }
    Ok(())
}

fn start(root: &Path, feat_id: &str, task_id: &str, json: bool) -> anyhow::Result<()> {
    let (feat, _) = lifecycle::start_task(root, feat_id, task_id)
        .with_context(|| format!("failed to start {feat_id}/{task_id}"))?;

    if json {
        print_json(&serde_json::json!({
            "feat_id": feat_id,
            "task_id": task_id,
            "status": "in_progress",
            "feat_status": feat.status,
        }))?;
    } else {
        println!("Started task [{task_id}] in {feat_id}");
        println!("  worktree: {}", feat.worktree_path);
    }
    Ok(())
}

fn finish(
    root: &Path,
    feat_id: &str,
    task_id: &str,
    result: FinishResult,
    json: bool,
) -> anyhow::Result<()> {
    let (feat, _) = lifecycle::finish_task(root, feat_id, task_id, result)
        .with_context(|| format!("failed to finish {feat_id}/{task_id}"))?;

    if json {
        print_json(&serde_json::json!({
            "feat_id": feat_id,
            "task_id": task_id,
            "status": result.task_status(),
            "feat_status": feat.status,
        }))?;
    } else {
        println!("Finished task [{task_id}] as {result}; feat is now {}", feat.status);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// gate
// ---------------------------------------------------------------------------

fn run_gate(root: &Path, feat_id: &str, task_id: &str, json: bool) -> anyhow::Result<()> {
    let report = gate::run_gate(root, feat_id, task_id)
        .with_context(|| format!("failed to run gate for {feat_id}/{task_id}"))?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Gate {} for {feat_id}/{task_id} ({} project)",
            report.result, report.project_type
        );
        let rows = report
            .commands
            .iter()
            .map(|c| vec![c.status.to_string(), c.exit_code.to_string(), c.command.clone()])
            .collect();
        print_table(&["RESULT", "EXIT", "COMMAND"], rows);
        print_list("Reasons", &report.reasons);
        println!("Log: {}", report.log_path);
        println!(
            "Counters: gate_fail_streak={} round_count={}",
            report.counters.gate_fail_streak, report.counters.round_count
        );
    }

    report.into_result()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// commit
// ---------------------------------------------------------------------------

fn prepare_commit(
    root: &Path,
    feat_id: &str,
    task_id: &str,
    req: &CommitRequest<'_>,
    json: bool,
) -> anyhow::Result<()> {
    let prepared = commit::prepare_commit(root, feat_id, task_id, req)
        .with_context(|| format!("failed to prepare commit for {feat_id}/{task_id}"))?;

    if json {
        return print_json(&prepared);
    }
    println!("Commit message: {}", prepared.message_file.display());
    println!();
    println!("{}", prepared.message.trim_end());
    println!();
    match &prepared.commit_hash {
        Some(hash) => println!("Committed: {hash}"),
        None => println!("Run: {}", prepared.suggested_command()),
    }
    Ok(())
}
