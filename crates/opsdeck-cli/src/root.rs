use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. `--root` flag / `OPSDECK_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.opsdeck/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_marker(&cwd, opsdeck_core::paths::OPSDECK_DIR)
        .or_else(|| find_marker(&cwd, ".git"))
        .unwrap_or(cwd)
}

/// Nearest ancestor of `start` (inclusive) containing a `marker` directory.
fn find_marker(start: &Path, marker: &str) -> Option<PathBuf> {
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
    fn finds_opsdeck_dir_above_subdir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".opsdeck")).unwrap();
        let subdir = dir.path().join("wallet/src");
        std::fs::create_dir_all(&subdir).unwrap();
        assert_eq!(find_marker(&subdir, ".opsdeck").unwrap(), dir.path());
    }

    #[test]
    fn opsdeck_marker_beats_git() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let inner = dir.path().join("tools");
        std::fs::create_dir_all(inner.join(".opsdeck")).unwrap();
        assert_eq!(find_marker(&inner, ".opsdeck").unwrap(), inner);
        assert_eq!(find_marker(&inner, ".git").unwrap(), dir.path());
    }
}
