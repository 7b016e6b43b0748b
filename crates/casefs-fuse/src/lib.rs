//! # casefs-fuse
//!
//! FUSE adapter for the case-insensitive resolver in `casefs-core`.
//!
//! The kernel addresses files by inode; every inode maps back to the path the
//! kernel asked for, and each request hands that path to [`CaseFs`], which
//! tries the exact spelling first and falls back to case-insensitive matching.
//!
//! Mounting needs the `fuse` feature on Linux. Other builds keep the same API
//! and fail at [`spawn`].
//!
//! [`CaseFs`]: casefs_core::CaseFs

pub mod handle;
pub mod inode;
pub mod reply;

/// Options for [`spawn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Source name shown in the mount table.
    pub fsname: String,
    pub allow_other: bool,
    /// Let the kernel unmount if the process dies.
    pub auto_unmount: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            fsname: "casefs".to_string(),
            allow_other: false,
            auto_unmount: false,
        }
    }
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod fs;

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod imp {
    pub use crate::fs::{spawn, CaseFuse, Session};
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
mod imp {
    use std::path::Path;
    use std::sync::mpsc::Sender;
    use std::sync::Arc;

    use casefs_core::{Backend, CaseFs};

    use crate::MountOptions;

    /// Placeholder session for builds without FUSE support. Never constructed.
    pub struct Session {
        _private: (),
    }

    impl Session {
        pub fn join(self) {}
    }

    pub fn spawn<B: Backend + 'static>(
        _fs: Arc<CaseFs<B>>,
        _mountpoint: &Path,
        _options: &MountOptions,
        _shutdown: Sender<()>,
    ) -> anyhow::Result<Session> {
        #[cfg(not(target_os = "linux"))]
        anyhow::bail!(
            "FUSE support is only available on Linux (current: {})",
            std::env::consts::OS
        );
        #[cfg(target_os = "linux")]
        anyhow::bail!("casefs was built without FUSE support; rebuild with --features fuse");
    }
}

pub use imp::*;
