//! Scheme-to-provider registry.
//!
//! The registry is built once, handed to the [`FileSystemManager`] at
//! construction, and shared with its [`NameResolver`] as an explicit
//! dependency. There is no process-wide singleton.
//!
//! [`FileSystemManager`]: crate::FileSystemManager
//! [`NameResolver`]: crate::NameResolver

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ManagerConfig;
use crate::error::VfsResult;
use crate::filesystem::FileSystem;
use crate::name::FileName;
use crate::object::FileObject;

/// How a scheme's names are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    /// `scheme://authority/path`
    Hierarchical,
    /// `scheme:inner-uri!/path`, opened over another file.
    Layered,
}

/// What a provider receives when asked to open a file system.
pub struct ProviderContext<'a> {
    /// The wrapped file, for layered schemes.
    pub inner: Option<Arc<FileObject>>,
    /// Manager-wide configuration.
    pub config: &'a ManagerConfig,
}

/// Creates file systems for one or more schemes.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Shape of the names this provider accepts.
    fn kind(&self) -> SchemeKind;

    /// Open a file system rooted at `root`.
    async fn create_file_system(
        &self,
        root: FileName,
        cx: ProviderContext<'_>,
    ) -> VfsResult<Arc<FileSystem>>;
}

/// Registry of providers keyed by lowercase scheme.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn FileProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a scheme, replacing any previous one.
    pub fn register(&mut self, scheme: &str, provider: impl FileProvider + 'static) {
        self.register_arc(scheme, Arc::new(provider));
    }

    /// Register a provider that's already in an Arc.
    pub fn register_arc(&mut self, scheme: &str, provider: Arc<dyn FileProvider>) {
        self.providers.insert(scheme.to_ascii_lowercase(), provider);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, scheme: &str, provider: impl FileProvider + 'static) -> Self {
        self.register(scheme, provider);
        self
    }

    /// Look up a provider by scheme.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn FileProvider>> {
        self.providers.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Check if a scheme is registered.
    pub fn contains(&self, scheme: &str) -> bool {
        self.providers.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Name shape of a registered scheme.
    pub fn kind(&self, scheme: &str) -> Option<SchemeKind> {
        self.providers
            .get(&scheme.to_ascii_lowercase())
            .map(|p| p.kind())
    }

    /// List all registered schemes.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<_> = self.providers.keys().map(|s| s.as_str()).collect();
        schemes.sort();
        schemes
    }

    /// Number of registered schemes.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
