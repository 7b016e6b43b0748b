//! Transport-neutral filesystem types shared by backends, the resolver and the FUSE adapter.

use std::ffi::OsString;
use std::io;
use std::time::SystemTime;

use nix::errno::Errno;

/// Result of a filesystem operation: a payload or an errno status.
pub type FsResult<T> = std::result::Result<T, Errno>;

/// Lazy, finite sequence of directory entries.
///
/// Restartable only by opening the directory again.
pub type DirStream = Box<dyn Iterator<Item = FsResult<DirEntry>> + Send>;

/// Convert an I/O error into the errno reported to the kernel.
pub fn errno_of(err: &io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(libc::EIO))
}

/// Per-request caller identity, passed through to the backend untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
    Symlink,
    BlockDevice,
    CharDevice,
    NamedPipe,
    Socket,
}

impl FileKind {
    /// Classify the `S_IFMT` bits of a raw mode.
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFLNK as u32 => FileKind::Symlink,
            m if m == libc::S_IFBLK as u32 => FileKind::BlockDevice,
            m if m == libc::S_IFCHR as u32 => FileKind::CharDevice,
            m if m == libc::S_IFIFO as u32 => FileKind::NamedPipe,
            m if m == libc::S_IFSOCK as u32 => FileKind::Socket,
            _ => FileKind::RegularFile,
        }
    }
}

/// File attributes as returned by `GetAttributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub kind: FileKind,
    /// Permission bits only (no file type bits).
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

impl DirEntry {
    pub fn new(name: impl Into<OsString>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Timestamp update for `SetTimes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    Now,
    At(SystemTime),
}

/// Split a root-relative path into `(parent, final segment)`.
///
/// The parent never carries a trailing separator; a single-segment path has
/// the empty string (the root) as its parent.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (path[..idx].trim_end_matches('/'), &path[idx + 1..]),
        None => ("", path),
    }
}

/// Join a parent path and a segment; the empty parent is the root.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
