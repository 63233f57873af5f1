use crate::output::{or_dash, print_json, print_table, short_time};
use anyhow::Context;
use clap::Subcommand;
use session_core::{notes, types::NoteCategory};
use std::path::Path;

#[derive(Subcommand)]
pub enum NoteSubcommand {
    /// Append a dev note to a session
    Add {
        session_id: String,
        #[arg(required = true)]
        content: Vec<String>,
        /// decision, deviation, blocker, or discovery
        #[arg(long, default_value = "decision")]
        category: NoteCategory,
        #[arg(long)]
        checkpoint: Option<u32>,
    },
    /// List dev notes, including gate overrides
    List {
        session_id: String,
        #[arg(long)]
        category: Option<NoteCategory>,
    },
}

pub fn run(root: &Path, subcmd: NoteSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        NoteSubcommand::Add {
            session_id,
            content,
            category,
            checkpoint,
        } => add(root, &session_id, &content.join(" "), category, checkpoint, json),
        NoteSubcommand::List {
            session_id,
            category,
        } => list(root, &session_id, category, json),
    }
}

fn add(
    root: &Path,
    session_id: &str,
    content: &str,
    category: NoteCategory,
    checkpoint: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    if category == NoteCategory::Override {
        anyhow::bail!("override notes are recorded by `progress complete --override`");
    }
    let mgr = super::manager(root)?;
    let note = mgr
        .add_dev_note(session_id, category, content, checkpoint)
        .with_context(|| format!("cannot add note to session '{session_id}'"))?;

    if json {
        print_json(&note)?;
    } else {
        println!("Added {} note {}", note.category, note.id);
    }
    Ok(())
}

fn list(
    root: &Path,
    session_id: &str,
    category: Option<NoteCategory>,
    json: bool,
) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let manifest = mgr
        .load(session_id)
        .with_context(|| format!("session '{session_id}' not found"))?;
    let selected = match category {
        Some(c) => notes::by_category(&manifest.dev_notes, c),
        None => manifest.dev_notes.iter().collect(),
    };

    if json {
        print_json(&selected)?;
        return Ok(());
    }
    if selected.is_empty() {
        println!("No notes.");
        return Ok(());
    }
    let rows = selected
        .iter()
        .map(|n| {
            vec![
                short_time(&n.created_at),
                n.category.to_string(),
                or_dash(n.checkpoint),
                n.content.lines().next().unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["RECORDED", "CATEGORY", "CHECKPOINT", "NOTE"], rows);
    Ok(())
}
