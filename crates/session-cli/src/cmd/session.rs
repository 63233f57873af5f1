use crate::output::{join_ids, or_dash, print_fields, print_json, print_table, short_time};
use anyhow::Context;
use clap::Subcommand;
use session_core::types::{Phase, SessionType, Status};
use std::path::Path;

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Create a new session in the intent phase
    Create {
        /// Session id, also the directory name (e.g. 2026-02-14_auth-flow)
        session_id: String,
        #[arg(required = true)]
        topic: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        /// full, quick, or research
        #[arg(long = "type", default_value = "full")]
        session_type: SessionType,
    },
    /// Show a session with its current checkpoint readiness
    Show { session_id: String },
    /// List sessions found on disk
    List {
        #[arg(long)]
        phase: Option<Phase>,
        #[arg(long)]
        status: Option<Status>,
    },
}

pub fn run(root: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SessionSubcommand::Create {
            session_id,
            topic,
            description,
            session_type,
        } => create(
            root,
            &session_id,
            &topic.join(" "),
            description.as_deref(),
            session_type,
            json,
        ),
        SessionSubcommand::Show { session_id } => show(root, &session_id, json),
        SessionSubcommand::List { phase, status } => list(root, phase, status, json),
    }
}

fn create(
    root: &Path,
    session_id: &str,
    topic: &str,
    description: Option<&str>,
    session_type: SessionType,
    json: bool,
) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let manifest = mgr
        .create_session(session_id, topic, description, session_type)
        .with_context(|| format!("failed to create session '{session_id}'"))?;

    if json {
        print_json(&manifest)?;
    } else {
        println!(
            "Created session '{}' ({}): {}",
            manifest.session_id, manifest.session_type, manifest.topic
        );
    }
    Ok(())
}

fn show(root: &Path, session_id: &str, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let view = mgr
        .view(session_id)
        .with_context(|| format!("session '{session_id}' not found"))?;

    if json {
        print_json(&view)?;
        return Ok(());
    }

    let m = &view.manifest;
    let progress = &m.build_progress;
    print_fields(&[
        ("Session", m.session_id.clone()),
        ("Topic", m.topic.clone()),
        ("Type", m.session_type.to_string()),
        ("Phase", m.current_phase.to_string()),
        ("Status", m.status.to_string()),
        ("Created", short_time(&m.created_at)),
        ("Updated", short_time(&m.updated_at)),
        (
            "Checkpoints",
            match progress.checkpoints_total {
                Some(total) => format!(
                    "{}/{} complete, current {}",
                    progress.checkpoints_completed.len(),
                    total,
                    or_dash(progress.current_checkpoint)
                ),
                None => "not initialized".to_string(),
            },
        ),
        ("Completed", join_ids(&progress.checkpoints_completed)),
        ("Branch", or_dash(m.git.branch.as_deref())),
        ("Commits", m.commits.len().to_string()),
        ("Plan", if view.plan_exists { "yes" } else { "no" }.to_string()),
    ]);

    if let Some(desc) = &m.description {
        println!("\n{desc}");
    }

    println!("\nPhase history:");
    let rows = Phase::all()
        .iter()
        .filter_map(|&p| m.phase_history.span(p).map(|span| (p, span)))
        .map(|(p, span)| {
            vec![
                p.to_string(),
                or_dash(span.started_at.as_ref().map(short_time)),
                or_dash(span.completed_at.as_ref().map(short_time)),
            ]
        })
        .collect();
    print_table(&["PHASE", "STARTED", "COMPLETED"], rows);

    if let Some(r) = &view.readiness {
        println!(
            "\nCheckpoint {}: {} task(s) incomplete{}",
            r.checkpoint,
            r.incomplete_tasks.len(),
            if view.eligible_tasks.is_empty() {
                String::new()
            } else {
                format!(", ready: {}", view.eligible_tasks.join(", "))
            }
        );
    }
    Ok(())
}

fn list(root: &Path, phase: Option<Phase>, status: Option<Status>, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let sessions: Vec<_> = mgr
        .list()
        .context("failed to list sessions")?
        .into_iter()
        .filter(|m| phase.map_or(true, |p| m.current_phase == p))
        .filter(|m| status.map_or(true, |s| m.status == s))
        .collect();

    if json {
        print_json(&sessions)?;
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    let rows = sessions
        .iter()
        .map(|m| {
            let progress = &m.build_progress;
            vec![
                m.session_id.clone(),
                m.current_phase.to_string(),
                m.status.to_string(),
                match progress.checkpoints_total {
                    Some(total) => format!("{}/{}", progress.checkpoints_completed.len(), total),
                    None => "-".to_string(),
                },
                m.topic.clone(),
            ]
        })
        .collect();
    print_table(&["SESSION", "PHASE", "STATUS", "CHECKPOINTS", "TOPIC"], rows);
    Ok(())
}
