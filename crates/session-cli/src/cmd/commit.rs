use crate::output::{or_dash, print_json, print_table, short_time};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum CommitSubcommand {
    /// Record a commit on a session
    Add {
        session_id: String,
        sha: String,
        #[arg(required = true)]
        message: Vec<String>,
        /// Checkpoint the commit belongs to
        #[arg(long)]
        checkpoint: Option<u32>,
    },
    /// List recorded commits
    List { session_id: String },
}

pub fn run(root: &Path, subcmd: CommitSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CommitSubcommand::Add {
            session_id,
            sha,
            message,
            checkpoint,
        } => add(root, &session_id, &sha, &message.join(" "), checkpoint, json),
        CommitSubcommand::List { session_id } => list(root, &session_id, json),
    }
}

fn add(
    root: &Path,
    session_id: &str,
    sha: &str,
    message: &str,
    checkpoint: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let commits = mgr
        .add_commit(session_id, sha, message, checkpoint)
        .with_context(|| format!("cannot record commit on session '{session_id}'"))?;

    if json {
        print_json(&serde_json::json!({ "session_id": session_id, "commits": commits }))?;
    } else {
        println!("Recorded commit {sha} ({} total)", commits.len());
    }
    Ok(())
}

fn list(root: &Path, session_id: &str, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let manifest = mgr
        .load(session_id)
        .with_context(|| format!("session '{session_id}' not found"))?;

    if json {
        print_json(&manifest.commits)?;
        return Ok(());
    }
    if manifest.commits.is_empty() {
        println!("No commits recorded.");
        return Ok(());
    }
    let rows = manifest
        .commits
        .iter()
        .map(|c| {
            vec![
                c.sha.chars().take(12).collect(),
                or_dash(c.checkpoint),
                short_time(&c.created_at),
                c.message.lines().next().unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["SHA", "CHECKPOINT", "RECORDED", "MESSAGE"], rows);
    Ok(())
}
