use crate::output::print_json;
use anyhow::Context;
use session_core::types::Status;
use std::path::Path;

pub fn run(root: &Path, session_id: &str, status: Status, json: bool) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let status = mgr
        .set_status(session_id, status)
        .with_context(|| format!("cannot set status of session '{session_id}'"))?;

    if json {
        print_json(&serde_json::json!({ "session_id": session_id, "status": status }))?;
    } else {
        println!("Session '{session_id}' is now {status}");
    }
    Ok(())
}
