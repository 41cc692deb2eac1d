//! File systems: one root, one backend, one object cache.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use strata_types::{Capability, CapabilitySet, NameScope};
use tokio::sync::Mutex;

use crate::cache::FileObjectCache;
use crate::error::{VfsError, VfsResult};
use crate::name::FileName;
use crate::object::{FileBacking, FileObject};

/// Backend behind one [`FileSystem`].
///
/// Shared resources (a client, an open archive, a parsed document) live
/// here. Per-object state lives in the [`FileBacking`] each call to
/// [`create_file`](Self::create_file) returns.
#[async_trait]
pub trait FileSystemBackend: Send + Sync + 'static {
    /// Add the capabilities this backend supports.
    fn add_capabilities(&self, caps: &mut CapabilitySet);

    /// Create the detached backing for a name not yet in the cache.
    fn create_file(&self, name: &FileName) -> VfsResult<Box<dyn FileBacking>>;

    /// Establish the shared connection. Called once, before `init`.
    async fn create_connection(&self) -> VfsResult<()> {
        Ok(())
    }

    /// Post-construction setup with access to the file system, e.g. eager
    /// indexing.
    async fn init(&self, fs: &Arc<FileSystem>) -> VfsResult<()> {
        let _ = fs;
        Ok(())
    }

    /// Tear down the shared connection. Called at most once.
    async fn close_communication_link(&self) -> VfsResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// A rooted collection of file objects sharing one backend.
pub struct FileSystem {
    root: FileName,
    capabilities: CapabilitySet,
    backend: Arc<dyn FileSystemBackend>,
    cache: Mutex<FileObjectCache>,
    closed: AtomicBool,
    me: Weak<FileSystem>,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("root", &self.root.to_string())
            .field("capabilities", &self.capabilities.to_string())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl FileSystem {
    /// Open a file system over `backend`.
    pub async fn open(root: FileName, backend: impl FileSystemBackend) -> VfsResult<Arc<Self>> {
        Self::open_arc(root, Arc::new(backend)).await
    }

    /// Open a file system over a shared backend.
    ///
    /// Collects capabilities, connects, then runs the backend's `init`.
    /// A failed `init` closes the connection again.
    pub async fn open_arc(root: FileName, backend: Arc<dyn FileSystemBackend>) -> VfsResult<Arc<Self>> {
        let root = root.root();
        let mut capabilities = CapabilitySet::new();
        backend.add_capabilities(&mut capabilities);
        backend.create_connection().await?;

        let fs = Arc::new_cyclic(|me| Self {
            root,
            capabilities,
            backend,
            cache: Mutex::new(FileObjectCache::new()),
            closed: AtomicBool::new(false),
            me: me.clone(),
        });

        if let Err(e) = fs.backend.init(&fs).await {
            fs.close().await;
            return Err(e);
        }
        tracing::debug!(root = %fs.root, capabilities = %fs.capabilities, "opened file system");
        Ok(fs)
    }

    /// Name of the root folder.
    pub fn root_name(&self) -> &FileName {
        &self.root
    }

    /// The root file object.
    pub async fn root(&self) -> VfsResult<Arc<FileObject>> {
        self.resolve_file(&self.root).await
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Fail with `UnsupportedCapability` unless `capability` is present.
    pub fn require(&self, capability: Capability, name: &FileName) -> VfsResult<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(VfsError::unsupported(name.to_string(), capability))
        }
    }

    pub fn backend(&self) -> &Arc<dyn FileSystemBackend> {
        &self.backend
    }

    /// The backend as its concrete type.
    pub fn backend_as<T: FileSystemBackend>(&self) -> Option<&T> {
        self.backend.as_any().downcast_ref::<T>()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The one cached object for `name`, creating it detached on a miss.
    pub async fn resolve_file(&self, name: &FileName) -> VfsResult<Arc<FileObject>> {
        if !name.same_root(&self.root) {
            return Err(VfsError::invalid_name(
                name.to_string(),
                format!("not in file system {}", self.root),
            ));
        }
        if self.is_closed() {
            return Err(VfsError::connection_closed(name.to_string()));
        }

        let mut cache = self.cache.lock().await;
        if let Some(file) = cache.get(name) {
            return Ok(file);
        }
        let backing = self.backend.create_file(name)?;
        let file = Arc::new(FileObject::new(name.clone(), self.me.clone(), backing));
        cache.put(file.clone());
        tracing::trace!(name = %name, "cached new file object");
        Ok(file)
    }

    /// Resolve a path relative to the root.
    pub async fn resolve_path(&self, path: &str) -> VfsResult<Arc<FileObject>> {
        let name = self.root.resolve(path, NameScope::FileSystem)?;
        self.resolve_file(&name).await
    }

    /// Cached object for `name`, without creating one.
    pub async fn get_file(&self, name: &FileName) -> Option<Arc<FileObject>> {
        self.cache.lock().await.get(name)
    }

    /// Cache `file`, replacing whatever was cached under its name.
    pub async fn put_file(&self, file: Arc<FileObject>) {
        self.cache.lock().await.put(file);
    }

    /// Build a detached object with a backing chosen by the caller.
    ///
    /// Backends that index eagerly use this with [`put_file`](Self::put_file).
    pub fn new_file(&self, name: FileName, backing: Box<dyn FileBacking>) -> Arc<FileObject> {
        Arc::new(FileObject::new(name, self.me.clone(), backing))
    }

    /// Drop `name` from the cache. The next resolve builds a fresh object.
    pub async fn invalidate(&self, name: &FileName) -> Option<Arc<FileObject>> {
        let removed = self.cache.lock().await.remove(name);
        if let Some(file) = &removed {
            file.refresh().await;
        }
        removed
    }

    pub async fn cached_names(&self) -> Vec<FileName> {
        self.cache.lock().await.names()
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Close the shared connection and drop the cache. Idempotent.
    ///
    /// Connection errors are logged, never returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(root = %self.root, "file system already closed");
            return;
        }
        if let Err(e) = self.backend.close_communication_link().await {
            tracing::warn!(root = %self.root, error = %e, "closing connection failed");
        }
        let dropped = self.cache.lock().await.drain();
        tracing::debug!(root = %self.root, objects = dropped.len(), "closed file system");
    }
}
