use crate::output::{join_ids, or_dash, print_json};
use anyhow::Context;
use clap::Subcommand;
use session_core::gate::{VerificationOverride, VerificationResult};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ProgressSubcommand {
    /// Set up checkpoint tracking for the execute phase
    Init { session_id: String, total: u32 },
    /// Start a checkpoint (the current one or the lowest uncompleted)
    Start { session_id: String, checkpoint: u32 },
    /// Complete the current checkpoint through the verification gate
    Complete {
        session_id: String,
        checkpoint: u32,
        /// Verification step that passed (repeatable)
        #[arg(long = "pass", value_name = "STEP")]
        passed: Vec<String>,
        /// Verification step that failed (repeatable)
        #[arg(long = "fail", value_name = "STEP")]
        failed: Vec<String>,
        /// JSON file holding an array of {step, passed, output?}
        #[arg(long, value_name = "FILE")]
        results: Option<PathBuf>,
        /// Bypass a failing gate; recorded as an override note
        #[arg(long = "override", value_name = "JUSTIFICATION")]
        justification: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ProgressSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProgressSubcommand::Init { session_id, total } => init(root, &session_id, total, json),
        ProgressSubcommand::Start {
            session_id,
            checkpoint,
        } => start(root, &session_id, checkpoint, json),
        ProgressSubcommand::Complete {
            session_id,
            checkpoint,
            passed,
            failed,
            results,
            justification,
        } => {
            let results = collect_results(passed, failed, results.as_deref())?;
            complete(
                root,
                &session_id,
                checkpoint,
                &results,
                justification.as_deref(),
                json,
            )
        }
    }
}

fn init(root: &Path, session_id: &str, total: u32, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let progress = mgr
        .init_execution_progress(session_id, total)
        .with_context(|| format!("cannot initialize progress for session '{session_id}'"))?;

    if json {
        print_json(&serde_json::json!({ "session_id": session_id, "build_progress": progress }))?;
    } else {
        println!("Tracking {total} checkpoint(s); current checkpoint 1");
    }
    Ok(())
}

fn start(root: &Path, session_id: &str, checkpoint: u32, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let progress = mgr
        .start_checkpoint(session_id, checkpoint)
        .with_context(|| format!("cannot start checkpoint {checkpoint}"))?;

    if json {
        print_json(&serde_json::json!({
            "session_id": session_id,
            "current_checkpoint": progress.current_checkpoint,
        }))?;
    } else {
        println!("Started checkpoint {checkpoint}");
    }
    Ok(())
}

fn complete(
    root: &Path,
    session_id: &str,
    checkpoint: u32,
    results: &[VerificationResult],
    justification: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let override_ = justification
        .map(VerificationOverride::new)
        .transpose()
        .context("invalid --override")?;

    let mgr = super::manager(root)?;
    let done = mgr
        .complete_checkpoint(session_id, checkpoint, results, override_.as_ref())
        .with_context(|| format!("cannot complete checkpoint {checkpoint}"))?;

    if json {
        print_json(&done)?;
        return Ok(());
    }

    println!("Completed checkpoint {}", done.checkpoint);
    if done.override_note.is_some() {
        for step in done.gate.unsatisfied_steps() {
            println!("  overridden: {step}");
        }
        for task in &done.gate.incomplete_tasks {
            println!("  overridden: task {task} incomplete");
        }
    }
    println!("  completed: {}", join_ids(&done.checkpoints_completed));
    println!("  next:      {}", or_dash(done.next_checkpoint));
    Ok(())
}

/// Merge `--pass`/`--fail` flags with an optional results file.
fn collect_results(
    passed: Vec<String>,
    failed: Vec<String>,
    file: Option<&Path>,
) -> anyhow::Result<Vec<VerificationResult>> {
    let mut results = match file {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<Vec<VerificationResult>>(&data)
                .with_context(|| format!("invalid verification results in {}", path.display()))?
        }
        None => Vec::new(),
    };
    results.extend(passed.into_iter().map(VerificationResult::passed));
    results.extend(failed.into_iter().map(|step| VerificationResult {
        step,
        passed: false,
        output: None,
    }));
    Ok(results)
}
