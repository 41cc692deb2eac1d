//! Archive backend.
//!
//! The whole entry list is indexed once when the file system opens. Every
//! entry gets a file object, and every ancestor an entry implies gets a
//! synthesized folder, so attach never touches the archive. Only content
//! reads go back to the codec.
//!
//! Read-only: the mutating capabilities are never declared.

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use strata_types::{Capability, CapabilitySet, FileType, NameScope};
use tokio::sync::RwLock;

use super::{blocking, require_inner};
use crate::content::ContentReader;
use crate::error::{VfsError, VfsResult};
use crate::filesystem::{FileSystem, FileSystemBackend};
use crate::name::FileName;
use crate::object::{FileBacking, FileContext, FileObject};
use crate::registry::{FileProvider, ProviderContext, SchemeKind};

/// One entry of an archive's central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, `/`-separated. Directories may end in `/`.
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// An opened archive. Calls may block; they run on the blocking pool.
pub trait ArchiveReader: Send + Sync {
    /// Entries in archive order.
    fn entries(&self) -> io::Result<Vec<ArchiveEntry>>;

    /// Decoded bytes of the entry named `name`.
    fn read_entry(&self, name: &str) -> io::Result<Vec<u8>>;

    fn close(&self) -> io::Result<()>;
}

/// Opens archives from their raw bytes.
pub trait ArchiveCodec: Send + Sync {
    fn open(&self, bytes: Vec<u8>) -> io::Result<Arc<dyn ArchiveReader>>;
}

/// Provider for archive schemes.
#[derive(Clone)]
pub struct ArchiveProvider {
    codec: Arc<dyn ArchiveCodec>,
}

impl ArchiveProvider {
    pub fn new(codec: Arc<dyn ArchiveCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl FileProvider for ArchiveProvider {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Layered
    }

    async fn create_file_system(&self, root: FileName, cx: ProviderContext<'_>) -> VfsResult<Arc<FileSystem>> {
        let inner = require_inner(&root, &cx)?;
        FileSystem::open(root, ArchiveBackend::new(inner, self.codec.clone())).await
    }
}

/// Backend over one archive file.
pub struct ArchiveBackend {
    inner: Arc<FileObject>,
    codec: Arc<dyn ArchiveCodec>,
    reader: RwLock<Option<Arc<dyn ArchiveReader>>>,
}

impl ArchiveBackend {
    pub fn new(inner: Arc<FileObject>, codec: Arc<dyn ArchiveCodec>) -> Self {
        Self {
            inner,
            codec,
            reader: RwLock::new(None),
        }
    }

    /// The archive file this backend reads.
    pub fn inner(&self) -> &Arc<FileObject> {
        &self.inner
    }

    async fn reader(&self, name: &FileName) -> VfsResult<Arc<dyn ArchiveReader>> {
        self.reader
            .read()
            .await
            .clone()
            .ok_or_else(|| VfsError::connection_closed(name.to_string()))
    }

    /// Register one object per entry plus every implied ancestor folder.
    async fn build_index(&self, fs: &Arc<FileSystem>, entries: Vec<ArchiveEntry>) -> VfsResult<()> {
        let root = fs.root_name().clone();
        fs.put_file(fs.new_file(root.clone(), Box::new(ArchiveFile::folder(None))))
            .await;

        for entry in entries {
            let name = match root.resolve(&entry.name, NameScope::Descendent) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(entry = %entry.name, error = %e, "skipping archive entry outside the root");
                    continue;
                }
            };

            if fs.get_file(&name).await.is_some() {
                if !entry.is_dir {
                    tracing::warn!(entry = %entry.name, "skipping duplicate archive entry");
                }
                // Directories may already exist as implied ancestors.
                continue;
            }

            let backing = if entry.is_dir {
                ArchiveFile::folder(Some(entry))
            } else {
                ArchiveFile::file(entry)
            };
            fs.put_file(fs.new_file(name.clone(), Box::new(backing))).await;

            let mut child = name;
            while let Some(parent_name) = child.parent() {
                let (parent, existed) = match fs.get_file(&parent_name).await {
                    Some(parent) => (parent, true),
                    None => {
                        let parent = fs.new_file(parent_name.clone(), Box::new(ArchiveFile::folder(None)));
                        fs.put_file(parent.clone()).await;
                        (parent, false)
                    }
                };
                let base = child.base_name().to_string();
                parent
                    .with_backing::<ArchiveFile, _>(|folder| folder.attach_child(base))
                    .await?;
                if existed {
                    break;
                }
                child = parent_name;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystemBackend for ArchiveBackend {
    fn add_capabilities(&self, caps: &mut CapabilitySet) {
        caps.extend([
            Capability::ReadContent,
            Capability::ListChildren,
            Capability::LastModified,
            Capability::Uri,
        ]);
    }

    /// Only reached for names the index does not contain.
    fn create_file(&self, _name: &FileName) -> VfsResult<Box<dyn FileBacking>> {
        Ok(Box::new(ArchiveFile::imaginary()))
    }

    async fn init(&self, fs: &Arc<FileSystem>) -> VfsResult<()> {
        let root = fs.root_name().clone();
        if !self.inner.exists().await? {
            tracing::debug!(archive = %self.inner.name(), "archive file missing, file system is empty");
            return Ok(());
        }

        let bytes = self.inner.content().read_to_end().await?;
        let codec = self.codec.clone();
        let reader = blocking(&root, move || codec.open(bytes)).await?;
        let entries = {
            let reader = reader.clone();
            blocking(&root, move || reader.entries()).await?
        };
        let count = entries.len();
        *self.reader.write().await = Some(reader);

        self.build_index(fs, entries).await?;
        tracing::debug!(archive = %self.inner.name(), entries = count, "indexed archive");
        Ok(())
    }

    async fn close_communication_link(&self) -> VfsResult<()> {
        let reader = self.reader.write().await.take();
        if let Some(reader) = reader {
            let name = self.inner.name().clone();
            blocking(&name, move || reader.close()).await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-object state: fixed at index time.
struct ArchiveFile {
    kind: FileType,
    entry: Option<ArchiveEntry>,
    children: Vec<String>,
}

impl ArchiveFile {
    fn folder(entry: Option<ArchiveEntry>) -> Self {
        Self {
            kind: FileType::Folder,
            entry,
            children: Vec::new(),
        }
    }

    fn file(entry: ArchiveEntry) -> Self {
        Self {
            kind: FileType::File,
            entry: Some(entry),
            children: Vec::new(),
        }
    }

    fn imaginary() -> Self {
        Self {
            kind: FileType::Imaginary,
            entry: None,
            children: Vec::new(),
        }
    }

    fn attach_child(&mut self, base: String) {
        if !self.children.contains(&base) {
            self.children.push(base);
        }
    }

    fn entry(&self, name: &FileName) -> VfsResult<&ArchiveEntry> {
        self.entry
            .as_ref()
            .ok_or_else(|| VfsError::invalid_state(name.to_string(), "no archive entry"))
    }
}

#[async_trait]
impl FileBacking for ArchiveFile {
    async fn attach(&mut self, _cx: &FileContext<'_>) -> VfsResult<FileType> {
        Ok(self.kind)
    }

    async fn list_child_names(&mut self, _cx: &FileContext<'_>) -> VfsResult<Vec<String>> {
        Ok(self.children.clone())
    }

    async fn content_size(&mut self, cx: &FileContext<'_>) -> VfsResult<u64> {
        Ok(self.entry(cx.name())?.size)
    }

    async fn last_modified(&mut self, cx: &FileContext<'_>) -> VfsResult<Option<SystemTime>> {
        Ok(self.entry(cx.name())?.modified)
    }

    async fn open_content_stream(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentReader> {
        let entry_name = self.entry(cx.name())?.name.clone();
        let backend = cx
            .file_system()
            .backend_as::<ArchiveBackend>()
            .ok_or_else(|| VfsError::invalid_state(cx.name().to_string(), "not an archive file system"))?;
        let reader = backend.reader(cx.name()).await?;
        let bytes = blocking(cx.name(), move || reader.read_entry(&entry_name)).await?;
        Ok(Box::new(io::Cursor::new(bytes)))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
