//! Loopback backend executing every operation against a host directory.
//!
//! Operations run with the credentials of the mounting process; the request
//! context is accepted for interface parity but not applied.

use std::ffi::{OsStr, OsString};
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions, Permissions};
use std::os::unix::fs::{
    DirBuilderExt, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::stat::{utimensat, Mode, SFlag, UtimensatFlags};
use nix::sys::statvfs::statvfs;
use nix::sys::time::TimeSpec;
use nix::unistd::AccessFlags;
use tracing::instrument;

use crate::backend::Backend;
use crate::types::{
    errno_of, Attr, DirEntry, DirStream, FileKind, FsResult, RequestContext, SetTime, StatFs,
};

#[cfg(target_os = "macos")]
const NO_XATTR: Errno = Errno::ENOATTR;
#[cfg(not(target_os = "macos"))]
const NO_XATTR: Errno = Errno::ENODATA;

/// Backend rooted at a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct Passthrough {
    root: PathBuf,
}

impl Passthrough {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a root-relative path.
    pub fn host_path(&self, path: &str) -> PathBuf {
        let rel = path.trim_start_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

fn io_err(err: std::io::Error) -> Errno {
    errno_of(&err)
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.max(0) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

fn attr_from_metadata(meta: &Metadata) -> Attr {
    Attr {
        ino: meta.ino(),
        size: meta.size(),
        blocks: meta.blocks(),
        atime: system_time(meta.atime(), meta.atime_nsec()),
        mtime: system_time(meta.mtime(), meta.mtime_nsec()),
        ctime: system_time(meta.ctime(), meta.ctime_nsec()),
        kind: FileKind::from_mode(meta.mode()),
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
    }
}

fn kind_of(file_type: fs::FileType) -> FileKind {
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_block_device() {
        FileKind::BlockDevice
    } else if file_type.is_char_device() {
        FileKind::CharDevice
    } else if file_type.is_fifo() {
        FileKind::NamedPipe
    } else if file_type.is_socket() {
        FileKind::Socket
    } else {
        FileKind::RegularFile
    }
}

fn timespec(time: Option<SetTime>) -> TimeSpec {
    match time {
        None => TimeSpec::new(0, libc::UTIME_OMIT as _),
        Some(SetTime::Now) => TimeSpec::new(0, libc::UTIME_NOW as _),
        Some(SetTime::At(t)) => {
            let d = t.duration_since(UNIX_EPOCH).unwrap_or_default();
            TimeSpec::new(d.as_secs() as _, d.subsec_nanos() as _)
        }
    }
}

/// Apply the `O_*` bits of an open request to std's builder.
fn open_options(flags: i32, create: Option<u32>) -> OpenOptions {
    let access = flags & libc::O_ACCMODE;
    let mut opts = OpenOptions::new();
    opts.read(access == libc::O_RDONLY || access == libc::O_RDWR)
        .write(access == libc::O_WRONLY || access == libc::O_RDWR || create.is_some())
        .custom_flags(flags & !(libc::O_ACCMODE | libc::O_CREAT | libc::O_EXCL));
    if let Some(mode) = create {
        opts.mode(mode);
        if flags & libc::O_EXCL != 0 {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    opts
}

impl Backend for Passthrough {
    type File = File;

    fn get_attr(&self, path: &str, _ctx: &RequestContext) -> FsResult<Attr> {
        let meta = fs::symlink_metadata(self.host_path(path)).map_err(io_err)?;
        Ok(attr_from_metadata(&meta))
    }

    fn chmod(&self, path: &str, mode: u32, _ctx: &RequestContext) -> FsResult<()> {
        fs::set_permissions(self.host_path(path), Permissions::from_mode(mode & 0o7777))
            .map_err(io_err)
    }

    fn chown(
        &self,
        path: &str,
        uid: Option<u32>,
        gid: Option<u32>,
        _ctx: &RequestContext,
    ) -> FsResult<()> {
        std::os::unix::fs::chown(self.host_path(path), uid, gid).map_err(io_err)
    }

    fn set_times(
        &self,
        path: &str,
        atime: Option<SetTime>,
        mtime: Option<SetTime>,
        _ctx: &RequestContext,
    ) -> FsResult<()> {
        utimensat(
            None,
            &self.host_path(path),
            &timespec(atime),
            &timespec(mtime),
            UtimensatFlags::FollowSymlink,
        )
    }

    fn truncate(&self, path: &str, size: u64, _ctx: &RequestContext) -> FsResult<()> {
        nix::unistd::truncate(&self.host_path(path), size as libc::off_t)
    }

    fn access(&self, path: &str, mask: i32, _ctx: &RequestContext) -> FsResult<()> {
        nix::unistd::access(&self.host_path(path), AccessFlags::from_bits_truncate(mask))
    }

    fn rmdir(&self, path: &str, _ctx: &RequestContext) -> FsResult<()> {
        fs::remove_dir(self.host_path(path)).map_err(io_err)
    }

    fn unlink(&self, path: &str, _ctx: &RequestContext) -> FsResult<()> {
        fs::remove_file(self.host_path(path)).map_err(io_err)
    }

    fn get_xattr(&self, path: &str, name: &OsStr, _ctx: &RequestContext) -> FsResult<Vec<u8>> {
        match xattr::get(self.host_path(path), name) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(NO_XATTR),
            Err(e) => Err(io_err(e)),
        }
    }

    fn list_xattr(&self, path: &str, _ctx: &RequestContext) -> FsResult<Vec<OsString>> {
        let attrs = xattr::list(self.host_path(path)).map_err(io_err)?;
        Ok(attrs.collect())
    }

    fn remove_xattr(&self, path: &str, name: &OsStr, _ctx: &RequestContext) -> FsResult<()> {
        xattr::remove(self.host_path(path), name).map_err(io_err)
    }

    fn set_xattr(
        &self,
        path: &str,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _ctx: &RequestContext,
    ) -> FsResult<()> {
        let host = self.host_path(path);
        if flags & (libc::XATTR_CREATE | libc::XATTR_REPLACE) != 0 {
            let exists = xattr::get(&host, name).map_err(io_err)?.is_some();
            if flags & libc::XATTR_CREATE != 0 && exists {
                return Err(Errno::EEXIST);
            }
            if flags & libc::XATTR_REPLACE != 0 && !exists {
                return Err(NO_XATTR);
            }
        }
        xattr::set(&host, name, value).map_err(io_err)
    }

    #[instrument(skip(self, _ctx), level = "debug")]
    fn open(&self, path: &str, flags: i32, _ctx: &RequestContext) -> FsResult<File> {
        open_options(flags, None)
            .open(self.host_path(path))
            .map_err(io_err)
    }

    fn open_dir(&self, path: &str, _ctx: &RequestContext) -> FsResult<DirStream> {
        let entries = fs::read_dir(self.host_path(path)).map_err(io_err)?;
        Ok(Box::new(entries.map(|entry| {
            let entry = entry.map_err(io_err)?;
            let kind = entry
                .file_type()
                .map(kind_of)
                .unwrap_or(FileKind::RegularFile);
            Ok(DirEntry::new(entry.file_name(), kind))
        })))
    }

    fn read_link(&self, path: &str, _ctx: &RequestContext) -> FsResult<PathBuf> {
        fs::read_link(self.host_path(path)).map_err(io_err)
    }

    fn statfs(&self, path: &str, _ctx: &RequestContext) -> FsResult<StatFs> {
        let st = statvfs(&self.host_path(path))?;
        Ok(StatFs {
            blocks: st.blocks() as u64,
            bfree: st.blocks_free() as u64,
            bavail: st.blocks_available() as u64,
            files: st.files() as u64,
            ffree: st.files_free() as u64,
            bsize: st.block_size() as u32,
            namelen: st.name_max() as u32,
            frsize: st.fragment_size() as u32,
        })
    }

    fn mkdir(&self, path: &str, mode: u32, _ctx: &RequestContext) -> FsResult<()> {
        DirBuilder::new()
            .mode(mode & 0o7777)
            .create(self.host_path(path))
            .map_err(io_err)
    }

    fn mknod(&self, path: &str, mode: u32, rdev: u32, _ctx: &RequestContext) -> FsResult<()> {
        nix::sys::stat::mknod(
            &self.host_path(path),
            SFlag::from_bits_truncate((mode & libc::S_IFMT as u32) as libc::mode_t),
            Mode::from_bits_truncate((mode & 0o7777) as libc::mode_t),
            rdev as libc::dev_t,
        )
    }

    #[instrument(skip(self, _ctx), level = "debug")]
    fn create(&self, path: &str, flags: i32, mode: u32, _ctx: &RequestContext) -> FsResult<File> {
        open_options(flags, Some(mode & 0o7777))
            .open(self.host_path(path))
            .map_err(io_err)
    }

    fn symlink(&self, target: &Path, link: &str, _ctx: &RequestContext) -> FsResult<()> {
        std::os::unix::fs::symlink(target, self.host_path(link)).map_err(io_err)
    }

    fn link(&self, old: &str, new: &str, _ctx: &RequestContext) -> FsResult<()> {
        fs::hard_link(self.host_path(old), self.host_path(new)).map_err(io_err)
    }

    fn rename(&self, old: &str, new: &str, _ctx: &RequestContext) -> FsResult<()> {
        fs::rename(self.host_path(old), self.host_path(new)).map_err(io_err)
    }
}
