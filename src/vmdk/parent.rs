//! Parent-chain path resolution and the cycle-detection rule from §9: an
//! append-only set of canonical paths visited while walking
//! `parentFileNameHint` links, failing closed on a repeat.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Normalize a `parentFileNameHint` value (which may use `\` as its
/// separator, regardless of host OS) and resolve it relative to the
/// directory containing the descriptor that referenced it.
pub fn resolve_relative(descriptor_dir: &Path, hint: &str) -> PathBuf {
    let normalized = hint.replace('\\', std::path::MAIN_SEPARATOR_STR);
    descriptor_dir.join(normalized)
}

/// Canonicalize `path` and record it as visited, failing if it was already
/// visited earlier in the same chain walk.
pub fn enter(visited: &mut HashSet<PathBuf>, path: &Path) -> Result<PathBuf> {
    let canonical = path.canonicalize().map_err(|e| Error::io(e, path))?;
    if !visited.insert(canonical.clone()) {
        return Err(Error::invalid_format(format!(
            "cyclic VMDK parent chain detected at {}",
            canonical.display()
        )));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslash_hints() {
        let dir = Path::new("/vms/base");
        let resolved = resolve_relative(dir, "snapshots\\delta.vmdk");
        assert_eq!(
            resolved,
            dir.join("snapshots").join("delta.vmdk")
        );
    }

    #[test]
    fn repeat_visit_is_rejected() {
        let mut visited = HashSet::new();
        let here = std::env::current_dir().unwrap();
        enter(&mut visited, &here).unwrap();
        assert!(enter(&mut visited, &here).is_err());
    }
}
