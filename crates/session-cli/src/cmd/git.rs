use crate::output::{or_dash, print_fields, print_json};
use anyhow::Context;
use std::path::Path;

pub fn run(
    root: &Path,
    session_id: &str,
    branch: Option<&str>,
    worktree: Option<&str>,
    base_branch: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mgr = super::manager(root)?;
    let git = if branch.is_none() && worktree.is_none() && base_branch.is_none() {
        mgr.load(session_id)
            .with_context(|| format!("session '{session_id}' not found"))?
            .git
    } else {
        mgr.set_git_context(session_id, branch, worktree, base_branch)
            .with_context(|| format!("cannot update git context of session '{session_id}'"))?
    };

    if json {
        print_json(&git)?;
    } else {
        print_fields(&[
            ("Branch", or_dash(git.branch.as_deref())),
            ("Worktree", or_dash(git.worktree.as_deref())),
            ("Base branch", or_dash(git.base_branch.as_deref())),
        ]);
    }
    Ok(())
}
