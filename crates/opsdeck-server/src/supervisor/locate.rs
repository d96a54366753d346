use std::path::{Path, PathBuf};

/// Directories searched after `PATH` for locally built or user-installed binaries.
pub fn fallback_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = home::home_dir() {
        dirs.push(home.join(".cargo").join("bin"));
        dirs.push(home.join(".local").join("bin"));
    }
    dirs.push(root.join("target").join("release"));
    dirs.push(root.join("target").join("debug"));
    dirs
}

/// Resolve `program` to an executable path.
///
/// A name containing a path separator is checked as-is (relative to `root`).
/// Otherwise the configured `search_path` is tried first, then `PATH`, then
/// [`fallback_dirs`]. On failure returns every directory that was searched.
pub fn locate(program: &str, root: &Path, search_path: &[PathBuf]) -> Result<PathBuf, Vec<PathBuf>> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        let candidate = if as_path.is_absolute() {
            as_path.to_path_buf()
        } else {
            root.join(as_path)
        };
        return if is_executable(&candidate) {
            Ok(candidate)
        } else {
            Err(vec![candidate])
        };
    }

    if !search_path.is_empty() {
        if let Some(joined) = join_paths(search_path) {
            if let Ok(found) = which::which_in(program, Some(joined), root) {
                return Ok(found);
            }
        }
    }

    if let Ok(found) = which::which(program) {
        return Ok(found);
    }

    let fallbacks = fallback_dirs(root);
    for dir in &fallbacks {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    let mut searched = search_path.to_vec();
    searched.extend(fallbacks);
    Err(searched)
}

fn join_paths(dirs: &[PathBuf]) -> Option<std::ffi::OsString> {
    std::env::join_paths(dirs).ok()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
