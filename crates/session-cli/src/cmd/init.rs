use crate::output::print_json;
use anyhow::Context;
use session_core::{
    config::{Config, WarnLevel},
    io, paths,
};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    if !json {
        println!("Initializing sessions in: {}", root.display());
    }

    // 1. Directory layout
    let sessions = paths::sessions_dir(root);
    let sessions_created = !sessions.is_dir();
    io::ensure_dir(&sessions).with_context(|| format!("failed to create {}", sessions.display()))?;

    // 2. config.yaml, never overwritten
    let config_path = paths::config_path(root);
    let config_created = !config_path.exists();
    let config = if config_created {
        let cfg = Config::new(&project_name);
        cfg.save(root).context("failed to write agents/config.yaml")?;
        cfg
    } else {
        Config::load(root).context("failed to read agents/config.yaml")?
    };

    let warnings = config.validate();
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        let messages: Vec<String> = warnings.iter().map(|w| w.message.clone()).collect();
        anyhow::bail!("invalid agents/config.yaml: {}", messages.join("; "));
    }

    // 3. Index database; its presence turns on sync after key transitions
    let index_path = config.index_path(root);
    let index_created = !index_path.exists();
    let engine = super::open_engine(root, &config)?;
    let indexed = engine.index().count()?;

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "config_created": config_created,
            "index_created": index_created,
            "index_path": index_path.display().to_string(),
            "indexed_sessions": indexed,
            "warnings": warnings,
        }))?;
        return Ok(());
    }

    let mark = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", mark(sessions_created), paths::SESSIONS_DIR);
    println!("  {} {}", mark(config_created), paths::CONFIG_FILE);
    println!("  {} {}", mark(index_created), index_path.display());
    for w in &warnings {
        println!("  warning: {}", w.message);
    }
    println!("\nReady. Create a session with: sessions session create <id> <topic>");
    Ok(())
}
