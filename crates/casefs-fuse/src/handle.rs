//! Open file and directory handles keyed by `fh`.

use std::collections::HashMap;

use casefs_core::DirEntry;

/// What an `fh` refers to.
pub enum Handle<F> {
    File(F),
    /// Directory listing, read in full at `opendir`.
    Dir(Vec<DirEntry>),
}

pub struct HandleTable<F> {
    handles: HashMap<u64, Handle<F>>,
    next_fh: u64,
}

impl<F> Default for HandleTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> HandleTable<F> {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
            next_fh: 1,
        }
    }

    pub fn insert(&mut self, handle: Handle<F>) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, handle);
        fh
    }

    pub fn file(&self, fh: u64) -> Option<&F> {
        match self.handles.get(&fh) {
            Some(Handle::File(file)) => Some(file),
            _ => None,
        }
    }

    pub fn dir(&self, fh: u64) -> Option<&[DirEntry]> {
        match self.handles.get(&fh) {
            Some(Handle::Dir(entries)) => Some(entries),
            _ => None,
        }
    }

    pub fn remove(&mut self, fh: u64) -> Option<Handle<F>> {
        self.handles.remove(&fh)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefs_core::FileKind;

    #[test]
    fn test_handles_are_unique_and_typed() {
        let mut table: HandleTable<&'static str> = HandleTable::new();
        let file = table.insert(Handle::File("f"));
        let dir = table.insert(Handle::Dir(vec![DirEntry::new("a", FileKind::RegularFile)]));
        assert_ne!(file, dir);
        assert_eq!(table.file(file), Some(&"f"));
        assert!(table.dir(file).is_none());
        assert_eq!(table.dir(dir).map(|d| d.len()), Some(1));
        assert!(table.file(dir).is_none());
    }

    #[test]
    fn test_remove() {
        let mut table: HandleTable<u8> = HandleTable::new();
        let fh = table.insert(Handle::File(7));
        assert!(table.remove(fh).is_some());
        assert!(table.remove(fh).is_none());
        assert!(table.is_empty());
    }
}
