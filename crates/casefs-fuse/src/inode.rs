//! Inode numbers for requested paths.
//!
//! The kernel addresses files by inode, while resolution works on paths. Each
//! inode therefore remembers the path *as the kernel spelled it*, so every
//! request re-runs exact-then-fallback resolution on that spelling.

use std::collections::HashMap;
use std::ffi::OsStr;

use casefs_core::join_path;

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
struct Entry {
    path: String,
    lookups: u64,
}

#[derive(Debug)]
pub struct InodeTable {
    by_ino: HashMap<u64, Entry>,
    by_path: HashMap<String, u64>,
    next_ino: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.by_ino.insert(
            ROOT_INO,
            Entry {
                path: String::new(),
                lookups: 1,
            },
        );
        table.by_path.insert(String::new(), ROOT_INO);
        table
    }

    pub fn path(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(|e| e.path.as_str())
    }

    /// Path of `name` inside directory `parent`.
    ///
    /// `None` for an unknown parent or a name that is not valid UTF-8.
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent = self.path(parent)?;
        let name = name.to_str()?;
        Some(join_path(parent, name))
    }

    pub fn peek(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    /// Inode for `path`, allocating one on first sight. Counts one kernel lookup.
    pub fn lookup(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            if let Some(entry) = self.by_ino.get_mut(&ino) {
                entry.lookups += 1;
            }
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_ino.insert(
            ino,
            Entry {
                path: path.to_string(),
                lookups: 1,
            },
        );
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Drop `nlookup` kernel references; the inode is released at zero.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(entry) = self.by_ino.get_mut(&ino) else {
            return;
        };
        entry.lookups = entry.lookups.saturating_sub(nlookup);
        if entry.lookups == 0 {
            if let Some(entry) = self.by_ino.remove(&ino) {
                if self.by_path.get(&entry.path) == Some(&ino) {
                    self.by_path.remove(&entry.path);
                }
            }
        }
    }

    /// Move `old` and everything below it to `new`.
    ///
    /// Inodes previously known at or below `new` keep their entries until
    /// forgotten but are no longer reachable by path.
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let prefix = format!("{}/", old);
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&prefix))
            .map(|(path, ino)| (path.clone(), *ino))
            .collect();

        let replaced = format!("{}/", new);
        self.by_path
            .retain(|path, _| path != new && !path.starts_with(&replaced));
        for (path, ino) in moved {
            self.by_path.remove(&path);
            let renamed = format!("{}{}", new, &path[old.len()..]);
            if let Some(entry) = self.by_ino.get_mut(&ino) {
                entry.path = renamed.clone();
            }
            self.by_path.insert(renamed, ino);
        }
    }

    pub fn len(&self) -> usize {
        self.by_ino.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ino.is_empty()
    }
}
