use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use session_core::{plan::ExecutionPlan, types::TaskStatus};
use std::collections::HashMap;
use std::path::Path;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// List plan tasks with their execution wave
    List {
        session_id: String,
        /// Checkpoint to list (default: the current one)
        #[arg(long)]
        checkpoint: Option<u32>,
    },
    /// Start a task whose dependencies are complete
    Start { session_id: String, task_id: String },
    /// Complete a task whose dependencies are complete
    Complete { session_id: String, task_id: String },
    /// Mark a task as blocked
    Block {
        session_id: String,
        task_id: String,
        #[arg(required = true)]
        reason: Vec<String>,
    },
    /// Show tasks of the current checkpoint that are ready to start
    Next { session_id: String },
}

pub fn run(root: &Path, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TaskSubcommand::List {
            session_id,
            checkpoint,
        } => list(root, &session_id, checkpoint, json),
        TaskSubcommand::Start {
            session_id,
            task_id,
        } => update(root, &session_id, &task_id, TaskStatus::InProgress, None, json),
        TaskSubcommand::Complete {
            session_id,
            task_id,
        } => update(root, &session_id, &task_id, TaskStatus::Complete, None, json),
        TaskSubcommand::Block {
            session_id,
            task_id,
            reason,
        } => update(
            root,
            &session_id,
            &task_id,
            TaskStatus::Blocked,
            Some(&reason.join(" ")),
            json,
        ),
        TaskSubcommand::Next { session_id } => next(root, &session_id, json),
    }
}

fn list(root: &Path, session_id: &str, checkpoint: Option<u32>, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let manifest = mgr
        .load(session_id)
        .with_context(|| format!("session '{session_id}' not found"))?;
    let plan = ExecutionPlan::load(root, session_id)
        .with_context(|| format!("no plan for session '{session_id}'"))?;

    let cp_id = checkpoint
        .or(manifest.build_progress.current_checkpoint)
        .or_else(|| plan.checkpoints.first().map(|c| c.id))
        .context("plan declares no checkpoints")?;
    let cp = plan.checkpoint(cp_id)?;
    let waves = plan.execution_waves(cp_id)?;
    let wave_of: HashMap<&str, usize> = waves
        .iter()
        .enumerate()
        .flat_map(|(i, wave)| wave.iter().map(move |id| (id.as_str(), i + 1)))
        .collect();

    if json {
        print_json(&serde_json::json!({
            "session_id": session_id,
            "checkpoint": cp_id,
            "status": cp.status,
            "tasks": cp.tasks().collect::<Vec<_>>(),
            "waves": waves,
        }))?;
        return Ok(());
    }

    println!("Checkpoint {}: {} [{}]", cp.id, cp.title, cp.status);
    let rows = cp
        .tasks()
        .map(|t| {
            vec![
                t.id.clone(),
                t.status.to_string(),
                or_dash(wave_of.get(t.id.as_str())),
                if t.depends_on.is_empty() {
                    "-".to_string()
                } else {
                    t.depends_on.join(",")
                },
                match &t.blocker {
                    Some(b) => format!("{} (blocked: {b})", t.title),
                    None => t.title.clone(),
                },
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "WAVE", "DEPENDS", "TITLE"], rows);
    Ok(())
}

fn update(
    root: &Path,
    session_id: &str,
    task_id: &str,
    status: TaskStatus,
    blocker: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let task = mgr
        .update_task(session_id, task_id, status, blocker)
        .with_context(|| format!("cannot set task '{task_id}' to {status}"))?;

    if json {
        print_json(&serde_json::json!({ "session_id": session_id, "task": task }))?;
    } else {
        match &task.blocker {
            Some(reason) => println!("Task [{}] blocked: {reason}", task.id),
            None => println!("Task [{}] is now {}", task.id, task.status),
        }
    }
    Ok(())
}

fn next(root: &Path, session_id: &str, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let tasks = mgr
        .eligible_tasks(session_id)
        .with_context(|| format!("cannot compute next tasks for session '{session_id}'"))?;

    if json {
        print_json(&tasks)?;
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks ready to start.");
        return Ok(());
    }
    let rows = tasks
        .iter()
        .map(|t| vec![t.id.clone(), t.title.clone()])
        .collect();
    print_table(&["ID", "TITLE"], rows);
    Ok(())
}
