//! strata-kernel: the engine behind strata.
//!
//! This crate provides:
//!
//! - **Names**: [`FileName`] and the [`NameResolver`], including layered
//!   names such as `zip:file:///a.zip!/dir/f.txt`
//! - **File objects**: lazily attached handles with a memoized type,
//!   children and content metadata ([`FileObject`], [`FileContent`])
//! - **File systems**: one object cache, one capability set and one shared
//!   connection per root ([`FileSystem`], [`FileSystemBackend`])
//! - **Providers**: local disk, archives, HTTP and structured documents
//!   ([`providers`])
//! - **Manager**: scheme registry plus every open file system
//!   ([`FileSystemManager`])
//!
//! ```text
//! uri ─▶ NameResolver ─▶ FileSystemManager ─▶ FileSystem ─▶ FileObjectCache
//!                              │                   │
//!                      ProviderRegistry     FileSystemBackend ─▶ FileBacking
//! ```

pub mod cache;
pub mod config;
pub mod content;
pub mod content_info;
pub mod error;
pub mod filesystem;
pub mod manager;
pub mod name;
pub mod object;
pub mod providers;
pub mod registry;
pub mod resolver;

pub use cache::FileObjectCache;
pub use config::{ArchiveConfig, ConfigError, HttpConfig, LocalConfig, ManagerConfig, MimeConfig};
pub use content::{ContentReader, ContentStream, FileContent};
pub use content_info::{ContentInfoFactory, DefaultContentInfoFactory};
pub use error::{ConnectionClosed, VfsError, VfsResult};
pub use filesystem::{FileSystem, FileSystemBackend};
pub use manager::FileSystemManager;
pub use name::{FileName, LAYER_SEPARATOR};
pub use object::{AttachState, FileBacking, FileContext, FileObject};
pub use registry::{FileProvider, ProviderContext, ProviderRegistry, SchemeKind};
pub use resolver::NameResolver;

pub use strata_types::{AttrValue, Attributes, Capability, CapabilitySet, ContentInfo, FileType, NameScope};
