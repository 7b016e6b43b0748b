//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - a temporary backing directory
//! - a sibling mountpoint
//! - a report output path
//!
//! # Usage
//!
//! ```ignore
//! use casefs_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! env.create_file("Docs/Report.PDF", b"pdf")?;
//! // env.backing_root, env.mountpoint, env.report_path are all isolated
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated backing tree plus mount and report locations
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Case-sensitive backing directory
    pub backing_root: PathBuf,
    /// Empty directory to mount on
    pub mountpoint: PathBuf,
    /// Where a report would be written (not created)
    pub report_path: PathBuf,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;

        let backing_root = root.join("backing");
        let mountpoint = root.join("mnt");
        std::fs::create_dir_all(&backing_root)?;
        std::fs::create_dir_all(&mountpoint)?;

        Ok(Self {
            _temp_dir: temp_dir,
            report_path: root.join("report.json"),
            backing_root,
            mountpoint,
        })
    }

    /// Create a test file with content under the backing root
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.backing_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test directory under the backing root
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.backing_root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Whether `relative_path` exists under the backing root with this exact case
    pub fn exists(&self, relative_path: &str) -> bool {
        self.backing_root.join(relative_path).symlink_metadata().is_ok()
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.backing_root.is_dir());
        assert!(env.mountpoint.is_dir());
        assert!(!env.report_path.exists());
    }

    #[test]
    fn test_environments_are_isolated() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.backing_root, env2.backing_root);
    }

    #[test]
    fn test_create_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_file("Docs/Report.PDF", b"pdf").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"pdf");
        assert!(env.exists("Docs/Report.PDF"));
    }

    #[test]
    fn test_create_dir() {
        let env = TestEnvironment::new().unwrap();
        env.create_dir("Src/nested").unwrap();
        assert!(env.exists("Src/nested"));
    }
}
