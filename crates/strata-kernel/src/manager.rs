//! The file system manager: URI in, file object out.
//!
//! The manager owns the provider registry and every file system it opened,
//! keyed by root name. Layered roots are opened recursively: the inner
//! file's file system first, then the outer one over the inner file.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strata_types::NameScope;
use tokio::sync::Mutex;

use crate::config::ManagerConfig;
use crate::error::{VfsError, VfsResult};
use crate::filesystem::FileSystem;
use crate::name::FileName;
use crate::object::FileObject;
use crate::registry::{ProviderContext, ProviderRegistry};
use crate::resolver::NameResolver;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Default)]
struct OpenFileSystems {
    by_root: HashMap<FileName, Arc<FileSystem>>,
    order: Vec<FileName>,
}

/// Entry point for resolving URIs across every registered scheme.
pub struct FileSystemManager {
    resolver: NameResolver,
    config: ManagerConfig,
    open: Mutex<OpenFileSystems>,
    closed: AtomicBool,
}

impl std::fmt::Debug for FileSystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemManager")
            .field("registry", self.resolver.registry())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl FileSystemManager {
    pub fn new(registry: ProviderRegistry, config: ManagerConfig) -> Self {
        Self::with_registry(Arc::new(registry), config)
    }

    /// Create a manager over a shared registry.
    pub fn with_registry(registry: Arc<ProviderRegistry>, config: ManagerConfig) -> Self {
        Self {
            resolver: NameResolver::new(registry),
            config,
            open: Mutex::new(OpenFileSystems::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Parse a URI without opening anything.
    pub fn parse_name(&self, uri: &str) -> VfsResult<FileName> {
        self.resolver.parse(uri)
    }

    /// Resolve a URI to its file object, opening file systems as needed.
    pub async fn resolve_file(&self, uri: &str) -> VfsResult<Arc<FileObject>> {
        let name = self.resolver.parse(uri)?;
        self.file(&name).await
    }

    /// Resolve `path` against `base` under `scope`.
    ///
    /// In [`NameScope::FileSystem`] scope a path with its own scheme may
    /// land in another file system.
    pub async fn resolve_relative(
        &self,
        base: &FileObject,
        path: &str,
        scope: NameScope,
    ) -> VfsResult<Arc<FileObject>> {
        let name = self.resolver.resolve(base.name(), path, scope)?;
        self.file(&name).await
    }

    /// The file object for an already parsed name.
    pub async fn file(&self, name: &FileName) -> VfsResult<Arc<FileObject>> {
        let fs = self.file_system(name).await?;
        fs.resolve_file(name).await
    }

    /// The file system serving `name`'s root, opening it on first use.
    pub fn file_system<'a>(&'a self, name: &'a FileName) -> BoxFuture<'a, VfsResult<Arc<FileSystem>>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(VfsError::invalid_state(name.to_string(), "file system manager is closed"));
            }
            let root = name.root();
            if let Some(fs) = self.open.lock().await.by_root.get(&root) {
                return Ok(fs.clone());
            }

            let provider = self.resolver.registry().get(root.scheme()).ok_or_else(|| {
                VfsError::invalid_name(root.to_string(), format!("no provider for scheme {:?}", root.scheme()))
            })?;

            let inner = match root.inner() {
                Some(inner_name) => {
                    let inner_fs = self.file_system(inner_name).await?;
                    Some(inner_fs.resolve_file(inner_name).await?)
                }
                None => None,
            };

            let cx = ProviderContext {
                inner,
                config: &self.config,
            };
            let fs = provider.create_file_system(root.clone(), cx).await?;

            let mut open = self.open.lock().await;
            if let Some(existing) = open.by_root.get(&root).cloned() {
                // Lost a race with a concurrent open of the same root.
                drop(open);
                fs.close().await;
                return Ok(existing);
            }
            open.by_root.insert(root.clone(), fs.clone());
            open.order.push(root);
            Ok(fs)
        })
    }

    /// Roots of the open file systems, in open order.
    pub async fn open_roots(&self) -> Vec<FileName> {
        self.open.lock().await.order.clone()
    }

    /// Close and forget one file system. Returns false if it was not open.
    pub async fn close_file_system(&self, root: &FileName) -> bool {
        let root = root.root();
        let removed = {
            let mut open = self.open.lock().await;
            open.order.retain(|r| r != &root);
            open.by_root.remove(&root)
        };
        match removed {
            Some(fs) => {
                fs.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every open file system, layered ones before what they wrap.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let file_systems: Vec<_> = {
            let mut open = self.open.lock().await;
            let order = std::mem::take(&mut open.order);
            order
                .into_iter()
                .rev()
                .filter_map(|root| open.by_root.remove(&root))
                .collect()
        };
        let count = file_systems.len();
        for fs in file_systems {
            fs.close().await;
        }
        tracing::debug!(file_systems = count, "closed file system manager");
    }
}
