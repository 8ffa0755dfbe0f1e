mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, feat::FeatSubcommand, query::QuerySubcommand, task::TaskSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ft",
    about = "Feat/task harness: worktree-isolated feats, gated tasks, auditable commits",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .harness/ or .git/)
    #[arg(long, global = true, env = "FT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the harness store in the current repository
    Init {
        /// Refuse to initialize unless the readiness report is valid
        #[arg(long, requires = "manifest")]
        strict: bool,
        /// Reference manifest the readiness report was produced from
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Manage feats
    Feat {
        #[command(subcommand)]
        subcommand: FeatSubcommand,
    },

    /// Manage tasks inside a feat
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Audit every feat for drift across documents, layout and git history
    Validate,

    /// Validate, then report threshold and completeness warnings
    Doctor,

    /// Query feats
    Query {
        #[command(subcommand)]
        subcommand: QuerySubcommand,
    },

    /// Inspect the settings document
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Rebuild the index from the feat documents on disk
    Reindex,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { strict, manifest } => {
            cmd::init::run(&root, strict, manifest.as_deref(), cli.json)
        }
        Commands::Feat { subcommand } => cmd::feat::run(&root, subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&root, subcommand, cli.json),
        Commands::Validate => cmd::validate::run(&root, cli.json),
        Commands::Doctor => cmd::doctor::run(&root, cli.json),
        Commands::Query { subcommand } => cmd::query::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Reindex => cmd::reindex::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
