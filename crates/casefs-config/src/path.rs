//! Path normalization for command-line inputs.
//!
//! The mount runs for the life of the process, so every path taken from the
//! command line or config is made absolute once at startup.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Canonicalize a path that must name an existing directory.
pub fn resolve_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve directory: {}", path.display()))?;
    if !canonical.is_dir() {
        anyhow::bail!("Not a directory: {}", path.display());
    }
    Ok(canonical)
}

/// Normalize a path where the target file may not exist yet.
///
/// Canonicalizes the parent directory and appends the filename.
/// Useful for output paths like the match report.
pub fn resolve_output(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let filename = path.file_name().context("Path has no filename")?;

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            let canonical_parent = parent.canonicalize().with_context(|| {
                format!("Failed to resolve parent directory: {}", parent.display())
            })?;
            Ok(canonical_parent.join(filename))
        }
        _ => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Ok(cwd.join(filename))
        }
    }
}

/// Refuse a backing root that contains, or sits inside, the mountpoint.
///
/// Both paths must already be canonical.
pub fn ensure_disjoint(mountpoint: &Path, backing: &Path) -> Result<()> {
    if mountpoint.starts_with(backing) || backing.starts_with(mountpoint) {
        anyhow::bail!(
            "Mountpoint '{}' and backing directory '{}' overlap",
            mountpoint.display(),
            backing.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_dir_existing() {
        let temp = tempdir().unwrap();
        let resolved = resolve_dir(temp.path()).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_dir_rejects_files_and_missing() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("f");
        std::fs::write(&file, b"").unwrap();
        assert!(resolve_dir(&file).is_err());
        assert!(resolve_dir(temp.path().join("missing")).is_err());
    }

    #[test]
    fn test_resolve_output_nonexistent_file() {
        let temp = tempdir().unwrap();
        let out = resolve_output(temp.path().join("report.json")).unwrap();
        assert!(out.is_absolute());
        assert!(out.ends_with("report.json"));
        assert!(!out.exists());
    }

    #[test]
    fn test_resolve_output_bare_filename_uses_cwd() {
        let out = resolve_output("report.json").unwrap();
        assert_eq!(out, std::env::current_dir().unwrap().join("report.json"));
    }

    #[test]
    fn test_resolve_output_missing_parent_fails() {
        let temp = tempdir().unwrap();
        assert!(resolve_output(temp.path().join("nope/report.json")).is_err());
    }

    #[test]
    fn test_ensure_disjoint() {
        assert!(ensure_disjoint(Path::new("/mnt/ci"), Path::new("/srv/data")).is_ok());
        assert!(ensure_disjoint(Path::new("/srv/data/mnt"), Path::new("/srv/data")).is_err());
        assert!(ensure_disjoint(Path::new("/srv"), Path::new("/srv/data")).is_err());
        assert!(ensure_disjoint(Path::new("/srv/data2"), Path::new("/srv/data")).is_ok());
    }
}
