//! Test utilities for strata.
//!
//! Stand-ins for the external collaborators the backends consume:
//! - [`ManifestCodec`]: an archive codec over manifest text (`manifest`)
//! - [`FakeHttp`]: a scripted HTTP connection manager with call counters
//! - [`FixedParser`]: a document parser returning a fixed part tree

pub mod archive;
pub mod http;
pub mod manifest;
pub mod mime;

use std::path::Path;
use std::sync::Arc;

use strata_kernel::{FileSystemManager, ManagerConfig, ProviderRegistry};

pub use archive::{ArchiveCounters, ManifestCodec, MemoryArchive};
pub use http::{FakeHttp, HttpCounters};
pub use manifest::{parse_manifest, render_manifest, ManifestEntry, ManifestError};
pub use mime::{sample_message, FixedParser};

/// `file://` URI for a host path.
pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Collaborators a test manager is wired with.
#[derive(Default)]
pub struct Fixtures {
    pub codec: Option<Arc<ManifestCodec>>,
    pub http: Option<Arc<FakeHttp>>,
    pub parser: Option<Arc<FixedParser>>,
}

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: ManifestCodec) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn with_http(mut self, http: FakeHttp) -> Self {
        self.http = Some(Arc::new(http));
        self
    }

    pub fn with_parser(mut self, parser: FixedParser) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// A manager serving `file` plus whichever collaborators are set.
    pub fn manager(&self, config: ManagerConfig) -> FileSystemManager {
        let mut registry = ProviderRegistry::with_defaults();
        if let Some(codec) = &self.codec {
            registry.register_archive(codec.clone(), &config.archive.schemes);
        }
        if let Some(parser) = &self.parser {
            registry.register_mime(parser.clone(), &config.mime.schemes);
        }
        if let Some(http) = &self.http {
            registry.register_http(http.clone());
        }
        FileSystemManager::new(registry, config)
    }
}
