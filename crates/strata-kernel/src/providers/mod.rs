//! Backend implementations.
//!
//! | Scheme | Backend | Shape |
//! |--------|---------|-------|
//! | `file` | [`LocalBackend`] | hierarchical, read/write |
//! | `zip` (configurable) | [`ArchiveBackend`] | layered, eager index |
//! | `http`, `https` | [`HttpBackend`] | hierarchical, lazy HEAD per object |
//! | `mime` (configurable) | [`MimeBackend`] | layered, tree over parsed parts |
//!
//! Byte-level work (archive decoding, document parsing, the HTTP wire) is
//! left to collaborators behind [`ArchiveCodec`], [`DocumentParser`] and
//! [`HttpConnectionManager`].

pub mod archive;
pub mod http;
pub mod local;
pub mod mime;

use std::io;
use std::sync::Arc;

pub use archive::{ArchiveBackend, ArchiveCodec, ArchiveEntry, ArchiveProvider, ArchiveReader};
pub use http::{
    HttpBackend, HttpConnection, HttpConnectionManager, HttpContentInfoFactory, HttpOptions, HttpProvider,
    HttpResponse,
};
pub use local::{LocalBackend, LocalProvider};
pub use mime::{DocumentParser, MimeBackend, MimeContentInfoFactory, MimeProvider, Part, PartBody};

use crate::error::{VfsError, VfsResult};
use crate::name::FileName;
use crate::object::FileObject;
use crate::registry::{ProviderContext, ProviderRegistry};

impl ProviderRegistry {
    /// A registry serving the `file` scheme.
    pub fn with_defaults() -> Self {
        Self::new().with("file", LocalProvider)
    }

    /// Serve `schemes` as archives decoded by `codec`.
    pub fn register_archive(&mut self, codec: Arc<dyn ArchiveCodec>, schemes: &[String]) {
        let provider = Arc::new(ArchiveProvider::new(codec));
        for scheme in schemes {
            self.register_arc(scheme, provider.clone());
        }
    }

    /// Serve `schemes` as documents parsed by `parser`.
    pub fn register_mime(&mut self, parser: Arc<dyn DocumentParser>, schemes: &[String]) {
        let provider = Arc::new(MimeProvider::new(parser));
        for scheme in schemes {
            self.register_arc(scheme, provider.clone());
        }
    }

    /// Serve `http` and `https` through `connections`.
    pub fn register_http(&mut self, connections: Arc<dyn HttpConnectionManager>) {
        let provider = Arc::new(HttpProvider::new(connections));
        self.register_arc("http", provider.clone());
        self.register_arc("https", provider);
    }
}

/// The wrapped file a layered provider opens over.
pub(crate) fn require_inner(root: &FileName, cx: &ProviderContext<'_>) -> VfsResult<Arc<FileObject>> {
    cx.inner
        .clone()
        .ok_or_else(|| VfsError::invalid_name(root.to_string(), "layered scheme needs an inner file"))
}

/// Run codec work on the blocking pool.
pub(crate) async fn blocking<T, F>(name: &FileName, f: F) -> VfsResult<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VfsError::access(name.to_string(), e))?
        .map_err(|e| VfsError::access(name.to_string(), e))
}
