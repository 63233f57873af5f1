use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use session_core::{
    config::Config,
    paths,
    sync::{OnboardOptions, OnboardSummary},
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum SyncSubcommand {
    /// Sync one session into the index
    One {
        /// Session id, session directory, or path to its state.json
        location: String,
    },
    /// Onboard every session under agents/sessions
    All {
        /// Override sync.max_parallel from config
        #[arg(long)]
        max_parallel: Option<usize>,
    },
}

pub fn run(root: &Path, subcmd: SyncSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load agents/config.yaml")?;
    match subcmd {
        SyncSubcommand::One { location } => one(root, &config, &location, json),
        SyncSubcommand::All { max_parallel } => all(root, &config, max_parallel, json),
    }
}

/// A bare session id resolves under the sessions dir; anything else is a path.
fn resolve_location(root: &Path, location: &str) -> PathBuf {
    let as_path = PathBuf::from(location);
    if as_path.exists() || paths::validate_session_id(location).is_err() {
        as_path
    } else {
        paths::session_dir(root, location)
    }
}

fn one(root: &Path, config: &Config, location: &str, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root, config)?;
    let path = resolve_location(root, location);
    let record = engine
        .sync_one(&path)
        .with_context(|| format!("failed to sync {}", path.display()))?;

    if json {
        print_json(&record)?;
    } else {
        println!(
            "Synced '{}' ({}, {})",
            record.session_id, record.phase, record.status
        );
    }
    Ok(())
}

fn all(
    root: &Path,
    config: &Config,
    max_parallel: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = super::open_engine(root, config)?;
    let mut options = OnboardOptions::from(config);
    if let Some(n) = max_parallel {
        options.max_parallel = n.max(1);
    }

    let rt = tokio::runtime::Runtime::new()?;
    let root_buf = root.to_path_buf();
    let summary: OnboardSummary = rt.block_on(async move {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; remaining sessions will be skipped");
                on_interrupt.cancel();
            }
        });
        engine.onboard_all(&root_buf, &options, &cancel).await
    })?;

    if json {
        print_json(&summary)?;
        return Ok(());
    }

    println!(
        "Synced {} session(s), {} failed",
        summary.synced.len(),
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        let rows = summary
            .failed
            .iter()
            .map(|f| vec![f.location.clone(), f.error.clone()])
            .collect();
        print_table(&["LOCATION", "ERROR"], rows);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bare_id_resolves_under_sessions_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_location(dir.path(), "2026-02-14_auth"),
            dir.path().join("agents/sessions/2026-02-14_auth")
        );
    }

    #[test]
    fn existing_path_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("state.json");
        std::fs::write(&file, "{}").unwrap();
        let loc = file.display().to_string();
        assert_eq!(resolve_location(dir.path(), &loc), file);
    }
}
