//! The operation surface offered to the protocol layer.
//!
//! Each operation picks a retry discipline and hands the (possibly resolved)
//! path to the backend unchanged.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::Backend;
use crate::report::{MatchReport, ReportError};
use crate::retry::Dispatcher;
use crate::types::{Attr, DirStream, FsResult, RequestContext, SetTime, StatFs};

/// Case-insensitive fallback in front of a [`Backend`].
///
/// Shared across request threads behind an `Arc`; the report is the only
/// mutable state and guards itself.
pub struct CaseFs<B: Backend> {
    backend: B,
    report: Option<Arc<MatchReport>>,
}

fn clean(path: &str) -> &str {
    path.trim_matches('/')
}

impl<B: Backend> CaseFs<B> {
    pub fn new(backend: B, report: Option<Arc<MatchReport>>) -> Self {
        Self { backend, report }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn report(&self) -> Option<&Arc<MatchReport>> {
        self.report.as_ref()
    }

    /// Persist the match report. Returns `Ok(false)` when reporting is off.
    ///
    /// Callers must have stopped dispatching operations first.
    pub fn flush_report(&self) -> Result<bool, ReportError> {
        match &self.report {
            Some(report) => report.flush().map(|_| true),
            None => Ok(false),
        }
    }

    /// Resolve `path` without performing any operation on it.
    pub fn resolve(&self, path: &str, ctx: &RequestContext) -> FsResult<Option<String>> {
        self.dispatch().resolve(clean(path), ctx)
    }

    fn dispatch(&self) -> Dispatcher<'_, B> {
        Dispatcher::new(&self.backend, self.report.as_deref())
    }

    // Single-path operations: whole-path retry.

    pub fn get_attr(&self, path: &str, ctx: &RequestContext) -> FsResult<Attr> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.get_attr(p, ctx))
    }

    pub fn chmod(&self, path: &str, mode: u32, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.chmod(p, mode, ctx))
    }

    pub fn chown(
        &self,
        path: &str,
        uid: Option<u32>,
        gid: Option<u32>,
        ctx: &RequestContext,
    ) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.chown(p, uid, gid, ctx))
    }

    pub fn set_times(
        &self,
        path: &str,
        atime: Option<SetTime>,
        mtime: Option<SetTime>,
        ctx: &RequestContext,
    ) -> FsResult<()> {
        self.dispatch().whole_path(clean(path), ctx, |p| {
            self.backend.set_times(p, atime, mtime, ctx)
        })
    }

    pub fn truncate(&self, path: &str, size: u64, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.truncate(p, size, ctx))
    }

    pub fn access(&self, path: &str, mask: i32, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.access(p, mask, ctx))
    }

    pub fn rmdir(&self, path: &str, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.rmdir(p, ctx))
    }

    pub fn unlink(&self, path: &str, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.unlink(p, ctx))
    }

    pub fn get_xattr(&self, path: &str, name: &OsStr, ctx: &RequestContext) -> FsResult<Vec<u8>> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.get_xattr(p, name, ctx))
    }

    pub fn list_xattr(&self, path: &str, ctx: &RequestContext) -> FsResult<Vec<OsString>> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.list_xattr(p, ctx))
    }

    pub fn remove_xattr(&self, path: &str, name: &OsStr, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.remove_xattr(p, name, ctx))
    }

    pub fn set_xattr(
        &self,
        path: &str,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        ctx: &RequestContext,
    ) -> FsResult<()> {
        self.dispatch().whole_path(clean(path), ctx, |p| {
            self.backend.set_xattr(p, name, value, flags, ctx)
        })
    }

    pub fn open(&self, path: &str, flags: i32, ctx: &RequestContext) -> FsResult<B::File> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.open(p, flags, ctx))
    }

    pub fn open_dir(&self, path: &str, ctx: &RequestContext) -> FsResult<DirStream> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.open_dir(p, ctx))
    }

    pub fn read_link(&self, path: &str, ctx: &RequestContext) -> FsResult<PathBuf> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.read_link(p, ctx))
    }

    pub fn statfs(&self, path: &str, ctx: &RequestContext) -> FsResult<StatFs> {
        self.dispatch()
            .whole_path(clean(path), ctx, |p| self.backend.statfs(p, ctx))
    }

    // Name-creating operations: parent-only retry.

    pub fn mkdir(&self, path: &str, mode: u32, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .parent_only(clean(path), ctx, |p| self.backend.mkdir(p, mode, ctx))
    }

    pub fn mknod(&self, path: &str, mode: u32, rdev: u32, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .parent_only(clean(path), ctx, |p| self.backend.mknod(p, mode, rdev, ctx))
    }

    pub fn create(
        &self,
        path: &str,
        flags: i32,
        mode: u32,
        ctx: &RequestContext,
    ) -> FsResult<B::File> {
        self.dispatch().parent_only(clean(path), ctx, |p| {
            self.backend.create(p, flags, mode, ctx)
        })
    }

    /// Create `link` pointing at `target`. Only the link name is resolved;
    /// the target is stored verbatim.
    pub fn symlink(&self, target: &Path, link: &str, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .parent_only(clean(link), ctx, |p| self.backend.symlink(target, p, ctx))
    }

    // Two-path operations: dual-path resolution.

    pub fn link(&self, old: &str, new: &str, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .dual_path(clean(old), clean(new), ctx, |o, n| self.backend.link(o, n, ctx))
    }

    pub fn rename(&self, old: &str, new: &str, ctx: &RequestContext) -> FsResult<()> {
        self.dispatch()
            .dual_path(clean(old), clean(new), ctx, |o, n| self.backend.rename(o, n, ctx))
    }
}
