use crate::output::{join_ids, or_dash, print_fields, print_json, print_table, short_time};
use anyhow::Context;
use clap::Subcommand;
use session_core::{
    config::Config,
    index::ListFilter,
    types::{Phase, Status},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum IndexSubcommand {
    /// List indexed sessions
    List {
        #[arg(long)]
        phase: Option<Phase>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Show one indexed row
    Show { session_id: String },
    /// Drop one session's row; the manifest is untouched
    Remove { session_id: String },
    /// Session counts by phase and status
    Stats,
    /// Remove every row; manifests are untouched and can be re-synced
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

pub fn run(root: &Path, subcmd: IndexSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load agents/config.yaml")?;
    let engine = super::open_engine(root, &config)?;
    let index = engine.index();

    match subcmd {
        IndexSubcommand::List {
            phase,
            status,
            project,
        } => {
            let rows = index.list(&ListFilter {
                phase,
                status,
                project_id: project,
            })?;
            if json {
                print_json(&rows)?;
                return Ok(());
            }
            if rows.is_empty() {
                println!("Index is empty. Run `sessions sync all` to onboard sessions.");
                return Ok(());
            }
            let table = rows
                .iter()
                .map(|r| {
                    vec![
                        r.session_id.clone(),
                        r.phase.to_string(),
                        r.status.to_string(),
                        match r.checkpoints_total {
                            Some(total) => format!("{}/{}", r.checkpoints_completed_count, total),
                            None => "-".to_string(),
                        },
                        short_time(&r.synced_at),
                        r.topic.clone(),
                    ]
                })
                .collect();
            print_table(
                &["SESSION", "PHASE", "STATUS", "CHECKPOINTS", "SYNCED", "TOPIC"],
                table,
            );
        }

        IndexSubcommand::Show { session_id } => {
            let record = index
                .get(&session_id)?
                .with_context(|| format!("session '{session_id}' is not indexed"))?;
            if json {
                print_json(&record)?;
                return Ok(());
            }
            print_fields(&[
                ("Session", record.session_id.clone()),
                ("Topic", record.topic.clone()),
                ("Type", record.session_type.clone()),
                ("Phase", record.phase.to_string()),
                ("Status", record.status.to_string()),
                ("Checkpoints", or_dash(record.checkpoints_total)),
                ("Completed", join_ids(&record.checkpoints_completed)),
                ("Current", or_dash(record.current_checkpoint)),
                ("Branch", or_dash(record.git_branch.as_deref())),
                ("Commits", record.commits.len().to_string()),
                ("Spec", format!("{} (exists: {})", record.spec_path, record.spec_exists)),
                ("Plan", format!("{} (exists: {})", record.plan_path, record.plan_exists)),
                ("Project", or_dash(record.project_id.as_deref())),
                ("Manifest", record.manifest_location.clone()),
                ("Updated", short_time(&record.updated_at)),
                ("Synced", short_time(&record.synced_at)),
            ]);
        }

        IndexSubcommand::Remove { session_id } => {
            let removed = index.remove(&session_id)?;
            if !removed {
                anyhow::bail!("session '{session_id}' is not indexed");
            }
            if json {
                print_json(&serde_json::json!({ "session_id": session_id, "removed": true }))?;
            } else {
                println!("Removed '{session_id}' from the index");
            }
        }

        IndexSubcommand::Stats => {
            let total = index.count()?;
            let phases = index.phase_counts()?;
            let statuses = index.status_counts()?;
            if json {
                print_json(&serde_json::json!({
                    "total": total,
                    "by_phase": phases,
                    "by_status": statuses,
                }))?;
                return Ok(());
            }
            println!("{total} session(s) indexed\n");
            let rows = phases
                .iter()
                .map(|(k, v)| vec!["phase".to_string(), k.clone(), v.to_string()])
                .chain(
                    statuses
                        .iter()
                        .map(|(k, v)| vec!["status".to_string(), k.clone(), v.to_string()]),
                )
                .collect();
            print_table(&["GROUP", "VALUE", "COUNT"], rows);
        }

        IndexSubcommand::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the index without --yes");
            }
            let removed = index.clear()?;
            if json {
                print_json(&serde_json::json!({ "removed": removed }))?;
            } else {
                println!("Removed {removed} row(s)");
            }
        }
    }
    Ok(())
}
