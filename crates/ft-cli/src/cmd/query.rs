use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use ft_core::{
    query::{self, FeatSummary, Filter},
    types::{FeatStatus, TaskStatus},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum QuerySubcommand {
    /// List every indexed feat with its task counts
    List,
    /// Show the full state and tasks documents of one feat
    Get {
        #[arg(long = "feat")]
        feat_id: String,
    },
    /// Filter feats; all given criteria must match
    Filter {
        /// Feat status (proposal, ready, in_progress, blocked, done, archived)
        #[arg(long)]
        status: Option<String>,
        /// Keep feats with at least one task in this status
        #[arg(long)]
        task_status: Option<String>,
        /// Case-insensitive text over id, title and branch
        #[arg(long)]
        contains: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: QuerySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        QuerySubcommand::List => {
            let items = query::list(root).context("failed to list feats")?;
            print_summaries(&items, json)
        }
        QuerySubcommand::Get { feat_id } => {
            let detail = query::get(root, &feat_id)
                .with_context(|| format!("failed to load feat '{feat_id}'"))?;
            // Both documents are structured; text mode prints them as YAML.
            if json {
                print_json(&detail)
            } else {
                print!("{}", serde_yaml::to_string(&detail)?);
                Ok(())
            }
        }
        QuerySubcommand::Filter {
            status,
            task_status,
            contains,
        } => {
            let filter = Filter {
                feat_status: status.as_deref().map(str::parse::<FeatStatus>).transpose()?,
                task_status: task_status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
                contains,
            };
            let items = query::filter(root, &filter).context("failed to filter feats")?;
            print_summaries(&items, json)
        }
    }
}

fn print_summaries(items: &[FeatSummary], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No matching feats.");
        return Ok(());
    }
    let rows = items
        .iter()
        .map(|i| {
            vec![
                i.feat_id.clone(),
                i.status.to_string(),
                or_dash(i.current_task_id.as_deref()),
                format!("{}/{}", i.task_stats.done, i.task_stats.total),
                i.title.clone(),
            ]
        })
        .collect();
    print_table(&["FEAT", "STATUS", "CURRENT", "DONE", "TITLE"], rows);
    Ok(())
}
