//! In-memory backend.
//!
//! Directory enumeration follows insertion order, every call is counted per
//! operation, and errors can be injected for a given `(operation, path)`
//! pair. Used to exercise the resolver without touching the host filesystem
//! and to simulate failures a root-run test suite cannot produce on disk
//! (permission denied, I/O errors mid-listing).

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use nix::errno::Errno;

use crate::backend::{Backend, OpenFile};
use crate::types::{
    join_path, split_path, Attr, DirEntry, DirStream, FileKind, FsResult, RequestContext, SetTime,
    StatFs,
};

const BLOCK_SIZE: u32 = 4096;
/// Largest file the in-memory tree will grow to; writes or truncates past it fail with `EFBIG`.
const MAX_FILE_SIZE: usize = 1 << 30;

type Data = Arc<Mutex<Vec<u8>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
enum Content {
    Dir(Vec<String>),
    File(Data),
    Symlink(PathBuf),
    Special(FileKind, u32),
}

#[derive(Debug, Clone)]
struct Node {
    ino: u64,
    content: Content,
    perm: u16,
    uid: u32,
    gid: u32,
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
    xattrs: Vec<(OsString, Vec<u8>)>,
}

impl Node {
    fn kind(&self) -> FileKind {
        match &self.content {
            Content::Dir(_) => FileKind::Directory,
            Content::File(_) => FileKind::RegularFile,
            Content::Symlink(_) => FileKind::Symlink,
            Content::Special(kind, _) => *kind,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.content, Content::Dir(_))
    }

    fn size(&self) -> u64 {
        match &self.content {
            Content::Dir(_) | Content::Special(..) => 0,
            Content::File(data) => lock(data).len() as u64,
            Content::Symlink(target) => target.as_os_str().len() as u64,
        }
    }

    fn attr(&self) -> Attr {
        let size = self.size();
        Attr {
            ino: self.ino,
            size,
            blocks: size.div_ceil(512),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            kind: self.kind(),
            perm: self.perm,
            nlink: if self.is_dir() { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: match self.content {
                Content::Special(_, rdev) => rdev,
                _ => 0,
            },
            blksize: BLOCK_SIZE,
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<String, Node>,
    next_ino: u64,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            next_ino: 1,
        };
        let root = tree.new_node(Content::Dir(Vec::new()), 0o755);
        tree.nodes.insert(String::new(), root);
        tree
    }

    fn new_node(&mut self, content: Content, perm: u16) -> Node {
        let ino = self.next_ino;
        self.next_ino += 1;
        let now = SystemTime::now();
        Node {
            ino,
            content,
            perm,
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
            ctime: now,
            xattrs: Vec::new(),
        }
    }

    fn get(&self, path: &str) -> FsResult<&Node> {
        if let Some(node) = self.nodes.get(path) {
            return Ok(node);
        }
        let (parent, _) = split_path(path);
        match self.nodes.get(parent) {
            Some(p) if !p.is_dir() => Err(Errno::ENOTDIR),
            _ => Err(Errno::ENOENT),
        }
    }

    fn get_mut(&mut self, path: &str) -> FsResult<&mut Node> {
        self.get(path)?;
        self.nodes.get_mut(path).ok_or(Errno::ENOENT)
    }

    fn check_parent(&self, path: &str) -> FsResult<()> {
        let (parent, _) = split_path(path);
        if self.get(parent)?.is_dir() {
            Ok(())
        } else {
            Err(Errno::ENOTDIR)
        }
    }

    fn insert(&mut self, path: &str, node: Node) -> FsResult<()> {
        if path.is_empty() || self.nodes.contains_key(path) {
            return Err(Errno::EEXIST);
        }
        self.check_parent(path)?;
        let (parent, name) = split_path(path);
        if let Some(Content::Dir(children)) = self.nodes.get_mut(parent).map(|p| &mut p.content) {
            children.push(name.to_string());
        }
        self.nodes.insert(path.to_string(), node);
        Ok(())
    }

    fn detach(&mut self, path: &str) {
        let (parent, name) = split_path(path);
        if let Some(Content::Dir(children)) = self.nodes.get_mut(parent).map(|p| &mut p.content) {
            children.retain(|c| c != name);
        }
    }

    fn remove(&mut self, path: &str) -> Option<Node> {
        self.detach(path);
        self.nodes.remove(path)
    }
}

/// Open handle onto an in-memory file.
#[derive(Debug, Clone)]
pub struct MemFile {
    data: Data,
}

impl OpenFile for MemFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let data = lock(&self.data);
        let start = (offset as usize).min(data.len());
        let end = (start + buf.len()).min(data.len());
        buf[..end - start].copy_from_slice(&data[start..end]);
        Ok(end - start)
    }

    fn write_at(&self, bytes: &[u8], offset: u64) -> FsResult<usize> {
        let start = usize::try_from(offset).map_err(|_| Errno::EFBIG)?;
        let end = start
            .checked_add(bytes.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(Errno::EFBIG)?;
        let mut data = lock(&self.data);
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn sync(&self, _datasync: bool) -> FsResult<()> {
        Ok(())
    }
}

/// Backend holding its whole tree in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    tree: Mutex<Tree>,
    calls: Mutex<HashMap<&'static str, usize>>,
    faults: Mutex<HashMap<(String, String), Errno>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Empty tree containing only the root directory.
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Tree::new()),
            calls: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// Create a directory and any missing ancestors.
    pub fn add_dir(&self, path: &str) {
        let mut tree = lock(&self.tree);
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join_path(&current, segment);
            if !tree.nodes.contains_key(&current) {
                let node = tree.new_node(Content::Dir(Vec::new()), 0o755);
                let _ = tree.insert(&current, node);
            }
        }
    }

    /// Create a regular file (and its ancestors) with the given contents.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let (parent, _) = split_path(path);
        self.add_dir(parent);
        let mut tree = lock(&self.tree);
        let node = tree.new_node(Content::File(Arc::new(Mutex::new(contents.to_vec()))), 0o644);
        let _ = tree.insert(path, node);
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        let (parent, _) = split_path(path);
        self.add_dir(parent);
        let mut tree = lock(&self.tree);
        let node = tree.new_node(Content::Symlink(PathBuf::from(target)), 0o777);
        let _ = tree.insert(path, node);
    }

    /// Make `op` fail with `errno` whenever it is called on exactly `path`.
    ///
    /// The pseudo-operation `"read_dir"` lets `open_dir` succeed and fails
    /// the listing after its first entry.
    pub fn fail(&self, op: &str, path: &str, errno: Errno) {
        lock(&self.faults).insert((op.to_string(), path.to_string()), errno);
    }

    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    /// Number of times `op` was invoked.
    pub fn calls(&self, op: &str) -> usize {
        lock(&self.calls).get(op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn exists(&self, path: &str) -> bool {
        lock(&self.tree).nodes.contains_key(path)
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match &lock(&self.tree).nodes.get(path)?.content {
            Content::File(data) => Some(lock(data).clone()),
            _ => None,
        }
    }

    /// Child names of a directory in enumeration order.
    pub fn entries(&self, path: &str) -> Vec<String> {
        match lock(&self.tree).nodes.get(path).map(|n| &n.content) {
            Some(Content::Dir(children)) => children.clone(),
            _ => Vec::new(),
        }
    }

    fn enter(&self, op: &'static str, path: &str) -> FsResult<()> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        match self.fault(op, path) {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn fault(&self, op: &str, path: &str) -> Option<Errno> {
        lock(&self.faults)
            .get(&(op.to_string(), path.to_string()))
            .copied()
    }

    fn with_node<T>(&self, path: &str, f: impl FnOnce(&mut Node) -> FsResult<T>) -> FsResult<T> {
        let mut tree = lock(&self.tree);
        let node = tree.get_mut(path)?;
        let out = f(node)?;
        node.ctime = SystemTime::now();
        Ok(out)
    }

    fn open_node(&self, path: &str, flags: i32) -> FsResult<MemFile> {
        let tree = lock(&self.tree);
        let node = tree.get(path)?;
        let writable = flags & libc::O_ACCMODE != libc::O_RDONLY;
        match &node.content {
            Content::File(data) => {
                if flags & libc::O_TRUNC != 0 && writable {
                    lock(data).clear();
                }
                Ok(MemFile { data: data.clone() })
            }
            Content::Dir(_) if writable => Err(Errno::EISDIR),
            _ => Ok(MemFile {
                data: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }
}

impl Backend for MemoryBackend {
    type File = MemFile;

    fn get_attr(&self, path: &str, _ctx: &RequestContext) -> FsResult<Attr> {
        self.enter("get_attr", path)?;
        Ok(lock(&self.tree).get(path)?.attr())
    }

    fn chmod(&self, path: &str, mode: u32, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("chmod", path)?;
        self.with_node(path, |node| {
            node.perm = (mode & 0o7777) as u16;
            Ok(())
        })
    }

    fn chown(
        &self,
        path: &str,
        uid: Option<u32>,
        gid: Option<u32>,
        _ctx: &RequestContext,
    ) -> FsResult<()> {
        self.enter("chown", path)?;
        self.with_node(path, |node| {
            if let Some(uid) = uid {
                node.uid = uid;
            }
            if let Some(gid) = gid {
                node.gid = gid;
            }
            Ok(())
        })
    }

    fn set_times(
        &self,
        path: &str,
        atime: Option<SetTime>,
        mtime: Option<SetTime>,
        _ctx: &RequestContext,
    ) -> FsResult<()> {
        self.enter("set_times", path)?;
        let resolve = |t: SetTime| match t {
            SetTime::Now => SystemTime::now(),
            SetTime::At(t) => t,
        };
        self.with_node(path, |node| {
            if let Some(t) = atime {
                node.atime = resolve(t);
            }
            if let Some(t) = mtime {
                node.mtime = resolve(t);
            }
            Ok(())
        })
    }

    fn truncate(&self, path: &str, size: u64, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("truncate", path)?;
        self.with_node(path, |node| match &node.content {
            Content::File(data) => {
                let size = usize::try_from(size)
                    .ok()
                    .filter(|&size| size <= MAX_FILE_SIZE)
                    .ok_or(Errno::EFBIG)?;
                lock(data).resize(size, 0);
                Ok(())
            }
            Content::Dir(_) => Err(Errno::EISDIR),
            _ => Err(Errno::EINVAL),
        })
    }

    fn access(&self, path: &str, _mask: i32, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("access", path)?;
        lock(&self.tree).get(path).map(|_| ())
    }

    fn rmdir(&self, path: &str, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("rmdir", path)?;
        let mut tree = lock(&self.tree);
        match &tree.get(path)?.content {
            Content::Dir(children) if !children.is_empty() => return Err(Errno::ENOTEMPTY),
            Content::Dir(_) if path.is_empty() => return Err(Errno::EBUSY),
            Content::Dir(_) => {}
            _ => return Err(Errno::ENOTDIR),
        }
        tree.remove(path);
        Ok(())
    }

    fn unlink(&self, path: &str, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("unlink", path)?;
        let mut tree = lock(&self.tree);
        if tree.get(path)?.is_dir() {
            return Err(Errno::EISDIR);
        }
        tree.remove(path);
        Ok(())
    }

    fn get_xattr(&self, path: &str, name: &OsStr, _ctx: &RequestContext) -> FsResult<Vec<u8>> {
        self.enter("get_xattr", path)?;
        let tree = lock(&self.tree);
        tree.get(path)?
            .xattrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or(Errno::ENODATA)
    }

    fn list_xattr(&self, path: &str, _ctx: &RequestContext) -> FsResult<Vec<OsString>> {
        self.enter("list_xattr", path)?;
        let tree = lock(&self.tree);
        Ok(tree
            .get(path)?
            .xattrs
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }

    fn remove_xattr(&self, path: &str, name: &OsStr, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("remove_xattr", path)?;
        self.with_node(path, |node| {
            let before = node.xattrs.len();
            node.xattrs.retain(|(n, _)| n != name);
            if node.xattrs.len() == before {
                Err(Errno::ENODATA)
            } else {
                Ok(())
            }
        })
    }

    fn set_xattr(
        &self,
        path: &str,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _ctx: &RequestContext,
    ) -> FsResult<()> {
        self.enter("set_xattr", path)?;
        self.with_node(path, |node| {
            match node.xattrs.iter_mut().find(|(n, _)| n == name) {
                Some(_) if flags & libc::XATTR_CREATE != 0 => Err(Errno::EEXIST),
                Some((_, v)) => {
                    *v = value.to_vec();
                    Ok(())
                }
                None if flags & libc::XATTR_REPLACE != 0 => Err(Errno::ENODATA),
                None => {
                    node.xattrs.push((name.to_os_string(), value.to_vec()));
                    Ok(())
                }
            }
        })
    }

    fn open(&self, path: &str, flags: i32, _ctx: &RequestContext) -> FsResult<MemFile> {
        self.enter("open", path)?;
        self.open_node(path, flags)
    }

    fn open_dir(&self, path: &str, _ctx: &RequestContext) -> FsResult<DirStream> {
        self.enter("open_dir", path)?;
        let tree = lock(&self.tree);
        let children = match &tree.get(path)?.content {
            Content::Dir(children) => children.clone(),
            _ => return Err(Errno::ENOTDIR),
        };
        let mut entries: Vec<FsResult<DirEntry>> = children
            .iter()
            .map(|name| {
                let kind = tree
                    .nodes
                    .get(&join_path(path, name))
                    .map(Node::kind)
                    .unwrap_or(FileKind::RegularFile);
                Ok(DirEntry::new(name.as_str(), kind))
            })
            .collect();
        if let Some(errno) = self.fault("read_dir", path) {
            entries.truncate(1);
            entries.push(Err(errno));
        }
        Ok(Box::new(entries.into_iter()))
    }

    fn read_link(&self, path: &str, _ctx: &RequestContext) -> FsResult<PathBuf> {
        self.enter("read_link", path)?;
        match &lock(&self.tree).get(path)?.content {
            Content::Symlink(target) => Ok(target.clone()),
            _ => Err(Errno::EINVAL),
        }
    }

    fn statfs(&self, path: &str, _ctx: &RequestContext) -> FsResult<StatFs> {
        self.enter("statfs", path)?;
        let tree = lock(&self.tree);
        tree.get(path)?;
        Ok(StatFs {
            blocks: 1 << 20,
            bfree: 1 << 19,
            bavail: 1 << 19,
            files: 1 << 16,
            ffree: (1u64 << 16).saturating_sub(tree.nodes.len() as u64),
            bsize: BLOCK_SIZE,
            namelen: 255,
            frsize: BLOCK_SIZE,
        })
    }

    fn mkdir(&self, path: &str, mode: u32, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("mkdir", path)?;
        let mut tree = lock(&self.tree);
        let node = tree.new_node(Content::Dir(Vec::new()), (mode & 0o7777) as u16);
        tree.insert(path, node)
    }

    fn mknod(&self, path: &str, mode: u32, rdev: u32, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("mknod", path)?;
        let content = match FileKind::from_mode(mode) {
            FileKind::RegularFile => Content::File(Arc::new(Mutex::new(Vec::new()))),
            FileKind::Directory | FileKind::Symlink => return Err(Errno::EINVAL),
            kind => Content::Special(kind, rdev),
        };
        let mut tree = lock(&self.tree);
        let node = tree.new_node(content, (mode & 0o7777) as u16);
        tree.insert(path, node)
    }

    fn create(&self, path: &str, flags: i32, mode: u32, _ctx: &RequestContext) -> FsResult<MemFile> {
        self.enter("create", path)?;
        {
            let mut tree = lock(&self.tree);
            if tree.nodes.contains_key(path) {
                if flags & libc::O_EXCL != 0 {
                    return Err(Errno::EEXIST);
                }
            } else {
                let content = Content::File(Arc::new(Mutex::new(Vec::new())));
                let node = tree.new_node(content, (mode & 0o7777) as u16);
                tree.insert(path, node)?;
            }
        }
        self.open_node(path, flags)
    }

    fn symlink(&self, target: &Path, link: &str, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("symlink", link)?;
        let mut tree = lock(&self.tree);
        let node = tree.new_node(Content::Symlink(target.to_path_buf()), 0o777);
        tree.insert(link, node)
    }

    fn link(&self, old: &str, new: &str, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("link", old)?;
        let mut tree = lock(&self.tree);
        let node = tree.get(old)?.clone();
        if node.is_dir() {
            return Err(Errno::EPERM);
        }
        tree.insert(new, node)
    }

    fn rename(&self, old: &str, new: &str, _ctx: &RequestContext) -> FsResult<()> {
        self.enter("rename", old)?;
        let mut tree = lock(&self.tree);
        let moving_dir = tree.get(old)?.is_dir();
        tree.check_parent(new)?;
        if old == new {
            return Ok(());
        }
        if new.starts_with(&format!("{}/", old)) || old.is_empty() {
            return Err(Errno::EINVAL);
        }
        if let Some(existing) = tree.nodes.get(new) {
            match (&existing.content, moving_dir) {
                (Content::Dir(children), true) if !children.is_empty() => {
                    return Err(Errno::ENOTEMPTY)
                }
                (Content::Dir(_), false) => return Err(Errno::EISDIR),
                (_, true) if !existing.is_dir() => return Err(Errno::ENOTDIR),
                _ => {}
            }
            tree.remove(new);
        }

        let prefix = format!("{}/", old);
        let moved: Vec<String> = tree
            .nodes
            .keys()
            .filter(|k| k.as_str() == old || k.starts_with(&prefix))
            .cloned()
            .collect();
        tree.detach(old);
        for key in moved {
            if let Some(node) = tree.nodes.remove(&key) {
                let new_key = format!("{}{}", new, &key[old.len()..]);
                tree.nodes.insert(new_key, node);
            }
        }
        let (parent, name) = split_path(new);
        if let Some(Content::Dir(children)) = tree.nodes.get_mut(parent).map(|p| &mut p.content) {
            children.push(name.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    fn names(backend: &MemoryBackend, path: &str) -> Vec<String> {
        backend
            .open_dir(path, &ctx())
            .unwrap()
            .map(|e| e.unwrap().name.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_enumeration_preserves_insertion_order() {
        let backend = MemoryBackend::new();
        backend.add_file("b.txt", b"");
        backend.add_file("A.txt", b"");
        backend.add_dir("c");
        assert_eq!(names(&backend, ""), vec!["b.txt", "A.txt", "c"]);
    }

    #[test]
    fn test_add_file_creates_ancestors() {
        let backend = MemoryBackend::new();
        backend.add_file("Docs/Sub/Report.PDF", b"pdf");
        assert!(backend.exists("Docs"));
        assert!(backend.exists("Docs/Sub"));
        assert_eq!(backend.contents("Docs/Sub/Report.PDF").unwrap(), b"pdf");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let backend = MemoryBackend::new();
        backend.add_file("Foo.txt", b"");
        assert!(backend.get_attr("Foo.txt", &ctx()).is_ok());
        assert_eq!(backend.get_attr("foo.txt", &ctx()), Err(Errno::ENOENT));
    }

    #[test]
    fn test_calls_are_counted() {
        let backend = MemoryBackend::new();
        let _ = backend.get_attr("x", &ctx());
        let _ = backend.get_attr("y", &ctx());
        assert_eq!(backend.calls("get_attr"), 2);
        backend.reset_calls();
        assert_eq!(backend.calls("get_attr"), 0);
    }

    #[test]
    fn test_injected_fault() {
        let backend = MemoryBackend::new();
        backend.add_dir("Locked");
        backend.fail("open_dir", "Locked", Errno::EACCES);
        assert!(matches!(
            backend.open_dir("Locked", &ctx()),
            Err(Errno::EACCES)
        ));
        backend.clear_faults();
        assert!(backend.open_dir("Locked", &ctx()).is_ok());
    }

    #[test]
    fn test_read_dir_fault_truncates_listing() {
        let backend = MemoryBackend::new();
        backend.add_file("d/one", b"");
        backend.add_file("d/two", b"");
        backend.fail("read_dir", "d", Errno::EIO);
        let items: Vec<_> = backend.open_dir("d", &ctx()).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err(Errno::EIO));
    }

    #[test]
    fn test_rename_moves_subtree() {
        let backend = MemoryBackend::new();
        backend.add_file("Src/inner/a.txt", b"a");
        backend.add_dir("Dst");
        backend.rename("Src", "Dst/Moved", &ctx()).unwrap();
        assert!(!backend.exists("Src"));
        assert_eq!(backend.contents("Dst/Moved/inner/a.txt").unwrap(), b"a");
        assert_eq!(names(&backend, "Dst"), vec!["Moved"]);
        assert_eq!(names(&backend, ""), vec!["Dst"]);
    }

    #[test]
    fn test_rmdir_rules() {
        let backend = MemoryBackend::new();
        backend.add_file("d/f", b"");
        assert_eq!(backend.rmdir("d", &ctx()), Err(Errno::ENOTEMPTY));
        assert_eq!(backend.rmdir("d/f", &ctx()), Err(Errno::ENOTDIR));
        backend.unlink("d/f", &ctx()).unwrap();
        backend.rmdir("d", &ctx()).unwrap();
        assert!(!backend.exists("d"));
    }

    #[test]
    fn test_create_write_read_through_handles() {
        let backend = MemoryBackend::new();
        let file = backend.create("new.txt", libc::O_RDWR, 0o644, &ctx()).unwrap();
        file.write_at(b"hello", 0).unwrap();
        let reader = backend.open("new.txt", libc::O_RDONLY, &ctx()).unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read_at(&mut buf, 1).unwrap();
        assert_eq!(&buf[..n], b"ello");
    }

    #[test]
    fn test_oversized_write_is_efbig() {
        let backend = MemoryBackend::new();
        let file = backend.create("big.bin", libc::O_RDWR, 0o644, &ctx()).unwrap();
        assert_eq!(file.write_at(b"x", u64::MAX), Err(Errno::EFBIG));
        assert_eq!(file.write_at(b"x", 1 << 40), Err(Errno::EFBIG));
        assert_eq!(backend.truncate("big.bin", u64::MAX, &ctx()), Err(Errno::EFBIG));
        assert_eq!(backend.contents("big.bin"), Some(Vec::new()));
    }

    #[test]
    fn test_parent_must_exist() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.mkdir("a/b", 0o755, &ctx()), Err(Errno::ENOENT));
        backend.add_file("f", b"");
        assert_eq!(backend.mkdir("f/b", 0o755, &ctx()), Err(Errno::ENOTDIR));
    }

    #[test]
    fn test_xattr_flags() {
        let backend = MemoryBackend::new();
        backend.add_file("f", b"");
        let name = OsStr::new("user.tag");
        assert_eq!(
            backend.set_xattr("f", name, b"v", libc::XATTR_REPLACE, &ctx()),
            Err(Errno::ENODATA)
        );
        backend.set_xattr("f", name, b"v", 0, &ctx()).unwrap();
        assert_eq!(
            backend.set_xattr("f", name, b"w", libc::XATTR_CREATE, &ctx()),
            Err(Errno::EEXIST)
        );
        assert_eq!(backend.get_xattr("f", name, &ctx()).unwrap(), b"v");
        assert_eq!(backend.list_xattr("f", &ctx()).unwrap(), vec![name.to_os_string()]);
        backend.remove_xattr("f", name, &ctx()).unwrap();
        assert_eq!(backend.get_xattr("f", name, &ctx()), Err(Errno::ENODATA));
    }
}
