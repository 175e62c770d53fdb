//! Socket path resolution for node processes.
//!
//! Each node role has a well-known default path under the system temp
//! directory; the host may override it per spawn with a CLI argument or a
//! `VIGIL_<ROLE>_SOCK` environment variable.

use std::io;
use std::path::{Path, PathBuf};

/// Default bind path for a node role, e.g. `/tmp/vigil-logic.sock`.
pub fn default_socket_path(role: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vigil-{role}.sock"))
}

/// Resolve the bind path: explicit argument, then `VIGIL_<ROLE>_SOCK`, then
/// the role default.
pub fn resolve_socket_path(arg: Option<PathBuf>, role: &str) -> PathBuf {
    if let Some(path) = arg {
        return path;
    }

    let var = format!("VIGIL_{}_SOCK", role.to_uppercase());
    if let Ok(path) = std::env::var(&var) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    default_socket_path(role)
}

/// Make sure the bind path's parent directory exists.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
