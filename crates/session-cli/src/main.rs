mod cmd;
mod output;
mod root;
mod tools;

use clap::{Parser, Subcommand};
use cmd::{
    commit::CommitSubcommand, index::IndexSubcommand, note::NoteSubcommand,
    progress::ProgressSubcommand, session::SessionSubcommand, sync::SyncSubcommand,
    task::TaskSubcommand,
};
use session_core::types::{Phase, Status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sessions",
    about = "Deterministic session state machine: phases, checkpoints, verification gates, and a queryable index",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from agents/sessions/ or .git/)
    #[arg(long, global = true, env = "SESSIONS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create agents/sessions, config.yaml, and the index
    Init,

    /// Create, show, and list sessions
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Move a session to its next phase
    Phase { session_id: String, phase: Phase },

    /// Checkpoint progress during the execute phase
    Progress {
        #[command(subcommand)]
        subcommand: ProgressSubcommand,
    },

    /// Record and list commits
    Commit {
        #[command(subcommand)]
        subcommand: CommitSubcommand,
    },

    /// Set the advisory status (active, paused, complete, failed)
    Status { session_id: String, status: Status },

    /// Show or update the git context; omitted flags keep their value
    Git {
        session_id: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        worktree: Option<String>,
        #[arg(long)]
        base_branch: Option<String>,
    },

    /// Plan task status and scheduling
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Dev notes on a session
    Note {
        #[command(subcommand)]
        subcommand: NoteSubcommand,
    },

    /// Project manifests into the index
    Sync {
        #[command(subcommand)]
        subcommand: SyncSubcommand,
    },

    /// Query the index
    Index {
        #[command(subcommand)]
        subcommand: IndexSubcommand,
    },

    /// Run as an MCP stdio server exposing the session_* tools
    Mcp,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Mcp => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    // Logs go to stderr so stdout stays clean for JSON and the MCP protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Session { subcommand } => cmd::session::run(&root, subcommand, cli.json),
        Commands::Phase { session_id, phase } => {
            cmd::phase::run(&root, &session_id, phase, cli.json)
        }
        Commands::Progress { subcommand } => cmd::progress::run(&root, subcommand, cli.json),
        Commands::Commit { subcommand } => cmd::commit::run(&root, subcommand, cli.json),
        Commands::Status { session_id, status } => {
            cmd::status::run(&root, &session_id, status, cli.json)
        }
        Commands::Git {
            session_id,
            branch,
            worktree,
            base_branch,
        } => cmd::git::run(
            &root,
            &session_id,
            branch.as_deref(),
            worktree.as_deref(),
            base_branch.as_deref(),
            cli.json,
        ),
        Commands::Task { subcommand } => cmd::task::run(&root, subcommand, cli.json),
        Commands::Note { subcommand } => cmd::note::run(&root, subcommand, cli.json),
        Commands::Sync { subcommand } => cmd::sync::run(&root, subcommand, cli.json),
        Commands::Index { subcommand } => cmd::index::run(&root, subcommand, cli.json),
        Commands::Mcp => cmd::mcp::run(&root),
    };

    if let Err(e) = result {
        // Full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
