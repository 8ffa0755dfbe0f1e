use crate::output::{or_dash, print_json, print_list, print_table};
use anyhow::Context;
use clap::Subcommand;
use ft_core::{
    archive,
    feat::{self, CreateFeat},
    store::{Index, Store},
    task::TaskStats,
};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum FeatSubcommand {
    /// Create a feat with its own branch and worktree
    Create {
        /// Human-readable title
        #[arg(long)]
        title: String,
        /// Identifier slug (default: derived from the title)
        #[arg(long)]
        slug: Option<String>,
        /// One-line goal recorded in the state document and proposal
        #[arg(long, default_value = "")]
        goal: String,
        /// Title of the first task (default: "Define implementation plan")
        #[arg(long)]
        first_task: Option<String>,
        /// Refuse to create unless the readiness report is valid
        #[arg(long, requires = "manifest")]
        strict: bool,
        /// Reference manifest the readiness report was produced from
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Show one feat, or every indexed feat when no id is given
    Status {
        #[arg(long = "feat")]
        feat_id: Option<String>,
    },

    /// Close a done or blocked feat: remove its worktree, move it to the archive
    Archive {
        #[arg(long = "feat")]
        feat_id: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: FeatSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        FeatSubcommand::Create {
            title,
            slug,
            goal,
            first_task,
            strict,
            manifest,
        } => {
            super::init::ensure_ready(root, strict, manifest.as_deref())?;
            create(
                root,
                &CreateFeat {
                    title: &title,
                    slug: slug.as_deref(),
                    goal: &goal,
                    first_task: first_task.as_deref(),
                },
                json,
            )
        }
        FeatSubcommand::Status { feat_id: Some(id) } => status(root, &id, json),
        FeatSubcommand::Status { feat_id: None } => list(root, json),
        FeatSubcommand::Archive { feat_id } => archive(root, &feat_id, json),
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

fn create(root: &Path, req: &CreateFeat<'_>, json: bool) -> anyhow::Result<()> {
    let (feat, tasks) = feat::create_feat(root, req)
        .with_context(|| format!("failed to create feat '{}'", req.title))?;

    if json {
        print_json(&serde_json::json!({ "feat": feat, "tasks": tasks }))?;
    } else {
        println!("Created feat: {}", feat.feat_id);
        println!("  branch:   {}", feat.branch);
        println!("  worktree: {}", feat.worktree_path);
        println!("  base:     {}", feat.base_ref);
        for task in &tasks.tasks {
            println!("  task:     {} {}", task.id, task.title);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn status(root: &Path, feat_id: &str, json: bool) -> anyhow::Result<()> {
    let (feat, tasks) = Store::new(root)
        .load(feat_id)
        .with_context(|| format!("failed to load feat '{feat_id}'"))?;

    if json {
        return print_json(&serde_json::json!({ "feat": feat, "tasks": tasks }));
    }

    let stats = TaskStats::of(&tasks.tasks);
    println!("Feat:     {}", feat.feat_id);
    println!("Title:    {}", feat.title);
    println!("Status:   {}", feat.status);
    println!("Branch:   {}", feat.branch);
    println!("Worktree: {}", feat.worktree_path);
    println!("Current:  {}", or_dash(feat.current_task_id.as_deref()));
    println!(
        "Tasks:    {} total, {} todo, {} in_progress, {} done, {} blocked",
        stats.total, stats.todo, stats.in_progress, stats.done, stats.blocked
    );
    println!(
        "Counters: gate_fail_streak={} no_progress_rounds={} round_count={}",
        feat.counters.gate_fail_streak,
        feat.counters.no_progress_rounds,
        feat.counters.round_count
    );
    if let Some(result) = feat.gate.last_result {
        println!(
            "Gate:     {} ({})",
            result,
            or_dash(feat.gate.last_task_id.as_deref())
        );
    }

    println!();
    let rows = tasks
        .tasks
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.status.to_string(),
                t.gate_result.map(|g| g.to_string()).unwrap_or_else(|| "-".into()),
                t.title.clone(),
            ]
        })
        .collect();
    print_table(&["TASK", "STATUS", "GATE", "TITLE"], rows);
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let index = Index::load(root).context("failed to load index")?;

    if json {
        return print_json(&index.feats);
    }
    if index.feats.is_empty() {
        println!("No feats. Create one with: ft feat create --title <title>");
        return Ok(());
    }
    let rows = index
        .feats
        .iter()
        .map(|e| {
            vec![
                e.feat_id.clone(),
                e.status.to_string(),
                e.branch.clone(),
                e.title.clone(),
            ]
        })
        .collect();
    print_table(&["FEAT", "STATUS", "BRANCH", "TITLE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// archive
// ---------------------------------------------------------------------------

fn archive(root: &Path, feat_id: &str, json: bool) -> anyhow::Result<()> {
    let report = archive::archive_feat(root, feat_id)
        .with_context(|| format!("failed to archive feat '{feat_id}'"))?;

    if json {
        return print_json(&report);
    }
    println!("Archived feat: {}", report.feat_id);
    if let Some(from) = report.closed_from_status {
        println!("  closed from:      {from}");
    }
    println!("  branch merged:    {}", report.cleanup.branch_merged);
    println!("  worktree removed: {}", report.cleanup.worktree_removed);
    println!("  branch deleted:   {}", report.cleanup.branch_deleted);
    if !report.cleanup.note.is_empty() {
        println!("  note:             {}", report.cleanup.note);
    }
    println!("  summary:          {}", display_rel(root, &report.summary_path));
    let notes: Vec<String> = report.notes.iter().map(|p| display_rel(root, p)).collect();
    print_list("Notes written", &notes);
    Ok(())
}

fn display_rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
