use session_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root that holds `agents/sessions/`.
///
/// Priority:
/// 1. `--root` flag / `SESSIONS_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `agents/sessions/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, paths::SESSIONS_DIR)
        .or_else(|| find_upward(&cwd, ".git"))
        .unwrap_or(cwd)
}

/// First ancestor of `start` (inclusive) containing the directory `marker`.
fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_sessions_dir_from_nested_path() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("agents/sessions")).unwrap();
        let subdir = dir.path().join("src/deep");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(
            find_upward(&subdir, paths::SESSIONS_DIR).as_deref(),
            Some(dir.path())
        );
    }

    #[test]
    fn missing_marker_yields_none() {
        let dir = TempDir::new().unwrap();
        let subdir = dir.path().join("a/b");
        std::fs::create_dir_all(&subdir).unwrap();
        assert!(find_upward(&subdir, "no-such-marker-dir").is_none());
    }
}
