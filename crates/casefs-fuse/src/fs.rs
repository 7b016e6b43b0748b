//! `fuser::Filesystem` over a [`CaseFs`].

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use casefs_config::{log_fuse_debug, log_fuse_info, log_fuse_warn};
use casefs_core::{
    join_path, split_path, Attr, Backend, CaseFs, FileKind, FsResult, OpenFile, RequestContext,
    SetTime,
};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr,
    Request, TimeOrNow,
};
use libc::{c_int, EBADF, EINVAL, ENOENT, ERANGE};

use crate::handle::{Handle, HandleTable};
use crate::inode::{InodeTable, ROOT_INO};
use crate::reply::{encode_xattr_names, xattr_reply, XattrReply};
use crate::MountOptions;

/// Attribute and entry cache lifetime handed to the kernel. Kept short since
/// the backing tree may change underneath the mount.
const TTL: Duration = Duration::from_secs(1);
const GENERATION: u64 = 0;
/// Inode reported in `readdir` for children the kernel has not looked up.
const UNKNOWN_INO: u64 = u64::MAX;

fn request_ctx(req: &Request<'_>) -> RequestContext {
    RequestContext {
        uid: req.uid(),
        gid: req.gid(),
        pid: req.pid(),
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Symlink => FileType::Symlink,
        FileKind::BlockDevice => FileType::BlockDevice,
        FileKind::CharDevice => FileType::CharDevice,
        FileKind::NamedPipe => FileType::NamedPipe,
        FileKind::Socket => FileType::Socket,
    }
}

fn file_attr(attr: &Attr, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn set_time(t: TimeOrNow) -> SetTime {
    match t {
        TimeOrNow::Now => SetTime::Now,
        TimeOrNow::SpecificTime(at) => SetTime::At(at),
    }
}

/// FUSE adapter: inode bookkeeping plus open handles, delegating every
/// operation to the shared [`CaseFs`].
pub struct CaseFuse<B: Backend> {
    fs: Arc<CaseFs<B>>,
    inodes: InodeTable,
    handles: HandleTable<B::File>,
    shutdown: Option<Sender<()>>,
}

impl<B: Backend> CaseFuse<B> {
    pub fn new(fs: Arc<CaseFs<B>>, shutdown: Option<Sender<()>>) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            shutdown,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).map(str::to_string).ok_or(ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        match self.inodes.child_path(parent, name) {
            Some(path) => Ok(path),
            None if self.inodes.path(parent).is_some() => Err(EINVAL),
            None => Err(ENOENT),
        }
    }

    /// Reply with the attributes of `path`, counting a kernel lookup on it.
    fn reply_entry(&mut self, path: &str, ctx: &RequestContext, reply: ReplyEntry) {
        match self.fs.get_attr(path, ctx) {
            Ok(attr) => {
                let ino = self.inodes.lookup(path);
                reply.entry(&TTL, &file_attr(&attr, ino), GENERATION);
            }
            Err(e) => reply.error(e as c_int),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &self,
        path: &str,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        ctx: &RequestContext,
    ) -> FsResult<Attr> {
        if let Some(mode) = mode {
            self.fs.chmod(path, mode, ctx)?;
        }
        if uid.is_some() || gid.is_some() {
            self.fs.chown(path, uid, gid, ctx)?;
        }
        if let Some(size) = size {
            self.fs.truncate(path, size, ctx)?;
        }
        if atime.is_some() || mtime.is_some() {
            self.fs
                .set_times(path, atime.map(set_time), mtime.map(set_time), ctx)?;
        }
        self.fs.get_attr(path, ctx)
    }
}

impl<B: Backend + 'static> Filesystem for CaseFuse<B> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        log_fuse_info!("filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        log_fuse_info!("filesystem destroyed", open_handles = self.handles.len());
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        self.reply_entry(&path, &request_ctx(req), reply);
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.get_attr(&path, &request_ctx(req)) {
            Ok(attr) => reply.attr(&TTL, &file_attr(&attr, ino)),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        let ctx = request_ctx(req);
        match self.apply_setattr(&path, mode, uid, gid, size, atime, mtime, &ctx) {
            Ok(attr) => reply.attr(&TTL, &file_attr(&attr, ino)),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn readlink(&mut self, req: &Request<'_>, ino: u64, reply: ReplyData) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.read_link(&path, &request_ctx(req)) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        let ctx = request_ctx(req);
        match self.fs.mknod(&path, mode, rdev, &ctx) {
            Ok(()) => self.reply_entry(&path, &ctx, reply),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        let ctx = request_ctx(req);
        match self.fs.mkdir(&path, mode, &ctx) {
            Ok(()) => self.reply_entry(&path, &ctx, reply),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.unlink(&path, &request_ctx(req)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.rmdir(&path, &request_ctx(req)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, link_name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        let ctx = request_ctx(req);
        match self.fs.symlink(target, &path, &ctx) {
            Ok(()) => self.reply_entry(&path, &ctx, reply),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        // RENAME_NOREPLACE / RENAME_EXCHANGE have no path-based equivalent.
        if flags != 0 {
            log_fuse_warn!("unsupported rename flags", flags = flags);
            return reply.error(EINVAL);
        }
        let (old, new) = match (self.child_of(parent, name), self.child_of(newparent, newname)) {
            (Ok(old), Ok(new)) => (old, new),
            (Err(e), _) | (_, Err(e)) => return reply.error(e),
        };
        match self.fs.rename(&old, &new, &request_ctx(req)) {
            Ok(()) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(e as c_int),
        }
    }

    fn link(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (old, new) = match (self.path_of(ino), self.child_of(newparent, newname)) {
            (Ok(old), Ok(new)) => (old, new),
            (Err(e), _) | (_, Err(e)) => return reply.error(e),
        };
        let ctx = request_ctx(req);
        match self.fs.link(&old, &new, &ctx) {
            Ok(()) => self.reply_entry(&new, &ctx, reply),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.open(&path, flags, &request_ctx(req)) {
            Ok(file) => {
                let fh = self.handles.insert(Handle::File(file));
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e as c_int),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(file) = self.handles.file(fh) else {
            return reply.error(EBADF);
        };
        let mut buf = vec![0u8; size as usize];
        match file.read_at(&mut buf, offset.max(0) as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(file) = self.handles.file(fh) else {
            return reply.error(EBADF);
        };
        match file.write_at(data, offset.max(0) as u64) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        match self.handles.file(fh) {
            Some(_) => reply.ok(),
            None => reply.error(EBADF),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.handles.remove(fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let Some(file) = self.handles.file(fh) else {
            return reply.error(EBADF);
        };
        match file.sync(datasync) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        let listing = self
            .fs
            .open_dir(&path, &request_ctx(req))
            .and_then(|entries| entries.collect::<FsResult<Vec<_>>>());
        match listing {
            Ok(entries) => {
                let fh = self.handles.insert(Handle::Dir(entries));
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e as c_int),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let (Some(entries), Some(path)) = (self.handles.dir(fh), self.inodes.path(ino)) else {
            return reply.error(EBADF);
        };
        let parent_ino = self
            .inodes
            .peek(split_path(path).0)
            .unwrap_or(ROOT_INO);

        let dots = [
            (ino, FileType::Directory, OsStr::new(".")),
            (parent_ino, FileType::Directory, OsStr::new("..")),
        ];
        let children = entries.iter().map(|entry| {
            let child_ino = entry
                .name
                .to_str()
                .and_then(|name| self.inodes.peek(&join_path(path, name)))
                .unwrap_or(UNKNOWN_INO);
            (child_ino, file_type(entry.kind), entry.name.as_os_str())
        });

        for (i, (child_ino, kind, name)) in dots
            .into_iter()
            .chain(children)
            .enumerate()
            .skip(offset.max(0) as usize)
        {
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        self.handles.remove(fh);
        reply.ok();
    }

    fn statfs(&mut self, req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.statfs(&path, &request_ctx(req)) {
            Ok(s) => reply.statfs(
                s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
            ),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn setxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.set_xattr(&path, name, value, flags, &request_ctx(req)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn getxattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.get_xattr(&path, name, &request_ctx(req)) {
            Ok(value) => match xattr_reply(&value, size) {
                XattrReply::Size(n) => reply.size(n),
                XattrReply::Data(data) => reply.data(data),
                XattrReply::Range => reply.error(ERANGE),
            },
            Err(e) => reply.error(e as c_int),
        }
    }

    fn listxattr(&mut self, req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.list_xattr(&path, &request_ctx(req)) {
            Ok(names) => {
                let data = encode_xattr_names(&names);
                match xattr_reply(&data, size) {
                    XattrReply::Size(n) => reply.size(n),
                    XattrReply::Data(data) => reply.data(data),
                    XattrReply::Range => reply.error(ERANGE),
                }
            }
            Err(e) => reply.error(e as c_int),
        }
    }

    fn removexattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.remove_xattr(&path, name, &request_ctx(req)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn access(&mut self, req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        match self.fs.access(&path, mask, &request_ctx(req)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e as c_int),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => return reply.error(e),
        };
        let ctx = request_ctx(req);
        let file = match self.fs.create(&path, flags, mode, &ctx) {
            Ok(file) => file,
            Err(e) => return reply.error(e as c_int),
        };
        match self.fs.get_attr(&path, &ctx) {
            Ok(attr) => {
                let fh = self.handles.insert(Handle::File(file));
                let ino = self.inodes.lookup(&path);
                reply.created(&TTL, &file_attr(&attr, ino), GENERATION, fh, 0);
            }
            Err(e) => reply.error(e as c_int),
        }
    }
}

fn mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName(options.fsname.clone()),
        MountOption::Subtype("casefs".to_string()),
    ];
    if options.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if options.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }
    opts
}

/// A mounted filesystem served on a background thread.
pub struct Session {
    inner: fuser::BackgroundSession,
}

impl Session {
    /// Unmount and wait for the request loop to finish. In-flight requests
    /// complete before this returns.
    pub fn join(self) {
        self.inner.join();
    }
}

/// Mount `fs` at `mountpoint` and serve it until [`Session::join`].
///
/// `shutdown` receives a message when the kernel tears the mount down
/// (e.g. an external `fusermount -u`).
pub fn spawn<B: Backend + 'static>(
    fs: Arc<CaseFs<B>>,
    mountpoint: &Path,
    options: &MountOptions,
    shutdown: Sender<()>,
) -> anyhow::Result<Session> {
    log_fuse_debug!("mounting", mountpoint = mountpoint.display(), fsname = &options.fsname);
    let filesystem = CaseFuse::new(fs, Some(shutdown));
    let inner = fuser::spawn_mount2(filesystem, mountpoint, &mount_options(options))
        .with_context(|| format!("Failed to mount at {}", mountpoint.display()))?;
    Ok(Session { inner })
}
