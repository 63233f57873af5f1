use crate::output::print_json;
use anyhow::Context;
use session_core::types::Phase;
use std::path::Path;

pub fn run(root: &Path, session_id: &str, phase: Phase, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let change = mgr
        .transition_phase(session_id, phase)
        .with_context(|| format!("cannot move session '{session_id}' to {phase}"))?;

    if json {
        print_json(&change)?;
    } else {
        println!(
            "Session '{}': {} -> {}",
            change.session_id, change.previous, change.phase
        );
    }
    Ok(())
}
