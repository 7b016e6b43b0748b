//! Capability interface over the backing store.
//!
//! The resolver and the retry logic only ever talk to a [`Backend`], so the
//! host directory ([`crate::Passthrough`]) and the in-memory tree
//! ([`crate::MemoryBackend`]) are interchangeable.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::types::{errno_of, Attr, DirStream, FsResult, RequestContext, SetTime, StatFs};

/// An open file handle returned by `open`/`create`.
pub trait OpenFile: Send + Sync + 'static {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize>;
    fn write_at(&self, data: &[u8], offset: u64) -> FsResult<usize>;
    fn sync(&self, datasync: bool) -> FsResult<()>;
}

impl OpenFile for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        FileExt::read_at(self, buf, offset).map_err(|e| errno_of(&e))
    }

    fn write_at(&self, data: &[u8], offset: u64) -> FsResult<usize> {
        FileExt::write_at(self, data, offset).map_err(|e| errno_of(&e))
    }

    fn sync(&self, datasync: bool) -> FsResult<()> {
        let res = if datasync {
            self.sync_data()
        } else {
            self.sync_all()
        };
        res.map_err(|e| errno_of(&e))
    }
}

/// Exact-path operations against the backing store.
///
/// Paths are root-relative, slash-delimited, and never start with `/`; the
/// empty string names the root. Implementations perform no case matching.
pub trait Backend: Send + Sync {
    type File: OpenFile;

    fn get_attr(&self, path: &str, ctx: &RequestContext) -> FsResult<Attr>;
    fn chmod(&self, path: &str, mode: u32, ctx: &RequestContext) -> FsResult<()>;
    fn chown(
        &self,
        path: &str,
        uid: Option<u32>,
        gid: Option<u32>,
        ctx: &RequestContext,
    ) -> FsResult<()>;
    fn set_times(
        &self,
        path: &str,
        atime: Option<SetTime>,
        mtime: Option<SetTime>,
        ctx: &RequestContext,
    ) -> FsResult<()>;
    fn truncate(&self, path: &str, size: u64, ctx: &RequestContext) -> FsResult<()>;
    fn access(&self, path: &str, mask: i32, ctx: &RequestContext) -> FsResult<()>;
    fn rmdir(&self, path: &str, ctx: &RequestContext) -> FsResult<()>;
    fn unlink(&self, path: &str, ctx: &RequestContext) -> FsResult<()>;

    fn get_xattr(&self, path: &str, name: &OsStr, ctx: &RequestContext) -> FsResult<Vec<u8>>;
    fn list_xattr(&self, path: &str, ctx: &RequestContext) -> FsResult<Vec<OsString>>;
    fn remove_xattr(&self, path: &str, name: &OsStr, ctx: &RequestContext) -> FsResult<()>;
    /// `flags` takes `XATTR_CREATE` / `XATTR_REPLACE`.
    fn set_xattr(
        &self,
        path: &str,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        ctx: &RequestContext,
    ) -> FsResult<()>;

    fn open(&self, path: &str, flags: i32, ctx: &RequestContext) -> FsResult<Self::File>;
    fn open_dir(&self, path: &str, ctx: &RequestContext) -> FsResult<DirStream>;
    fn read_link(&self, path: &str, ctx: &RequestContext) -> FsResult<PathBuf>;
    fn statfs(&self, path: &str, ctx: &RequestContext) -> FsResult<StatFs>;

    fn mkdir(&self, path: &str, mode: u32, ctx: &RequestContext) -> FsResult<()>;
    fn mknod(&self, path: &str, mode: u32, rdev: u32, ctx: &RequestContext) -> FsResult<()>;
    fn create(
        &self,
        path: &str,
        flags: i32,
        mode: u32,
        ctx: &RequestContext,
    ) -> FsResult<Self::File>;
    fn symlink(&self, target: &Path, link: &str, ctx: &RequestContext) -> FsResult<()>;

    fn link(&self, old: &str, new: &str, ctx: &RequestContext) -> FsResult<()>;
    fn rename(&self, old: &str, new: &str, ctx: &RequestContext) -> FsResult<()>;
}
