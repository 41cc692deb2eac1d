//! Per-file-system object cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::name::FileName;
use crate::object::FileObject;

/// Map from resolved name to the one live [`FileObject`] for it.
///
/// Not synchronized on its own: the owning [`FileSystem`] keeps it behind
/// its coarse lock.
///
/// [`FileSystem`]: crate::FileSystem
#[derive(Debug, Default)]
pub struct FileObjectCache {
    files: HashMap<FileName, Arc<FileObject>>,
}

impl FileObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &FileName) -> Option<Arc<FileObject>> {
        self.files.get(name).cloned()
    }

    /// Insert `file`, replacing any object previously cached under its name.
    pub fn put(&mut self, file: Arc<FileObject>) -> Option<Arc<FileObject>> {
        self.files.insert(file.name().clone(), file)
    }

    pub fn remove(&mut self, name: &FileName) -> Option<Arc<FileObject>> {
        self.files.remove(name)
    }

    /// Remove every object, returning them.
    pub fn drain(&mut self) -> Vec<Arc<FileObject>> {
        self.files.drain().map(|(_, file)| file).collect()
    }

    /// Cached names, sorted by URI.
    pub fn names(&self) -> Vec<FileName> {
        let mut names: Vec<_> = self.files.keys().cloned().collect();
        names.sort_by_key(|n| n.to_string());
        names
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
