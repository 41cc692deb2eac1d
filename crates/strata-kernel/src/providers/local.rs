//! Local filesystem backend.
//!
//! `file:///a/b` maps to the host path `/a/b`. Writes are allowed unless
//! the manager config marks local file systems read-only, in which case
//! the write capabilities are never declared.

use std::any::Any;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use strata_types::{AttrValue, Attributes, Capability, CapabilitySet, FileType};
use tokio::fs;

use crate::content::ContentReader;
use crate::error::{VfsError, VfsResult};
use crate::filesystem::{FileSystem, FileSystemBackend};
use crate::name::FileName;
use crate::object::{FileBacking, FileContext};
use crate::registry::{FileProvider, ProviderContext, SchemeKind};

/// Provider for the `file` scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

#[async_trait]
impl FileProvider for LocalProvider {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Hierarchical
    }

    async fn create_file_system(&self, root: FileName, cx: ProviderContext<'_>) -> VfsResult<Arc<FileSystem>> {
        let backend = if cx.config.local.read_only {
            LocalBackend::read_only()
        } else {
            LocalBackend::new()
        };
        FileSystem::open(root, backend).await
    }
}

/// Local filesystem backend.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    read_only: bool,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self { read_only: false }
    }

    /// Create a read-only local backend.
    pub fn read_only() -> Self {
        Self { read_only: true }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Host path for a name.
    pub fn host_path(name: &FileName) -> PathBuf {
        let mut path = PathBuf::from("/");
        for segment in name.segments() {
            path.push(segment);
        }
        path
    }

    /// Extract permissions from std::fs::Metadata (unix only).
    #[cfg(unix)]
    fn extract_permissions(meta: &std::fs::Metadata) -> Option<u32> {
        use std::os::unix::fs::PermissionsExt;
        Some(meta.permissions().mode())
    }

    #[cfg(not(unix))]
    fn extract_permissions(_meta: &std::fs::Metadata) -> Option<u32> {
        None
    }
}

#[async_trait]
impl FileSystemBackend for LocalBackend {
    fn add_capabilities(&self, caps: &mut CapabilitySet) {
        caps.extend([
            Capability::ReadContent,
            Capability::ListChildren,
            Capability::LastModified,
            Capability::Attributes,
            Capability::Uri,
        ]);
        if !self.read_only {
            caps.extend([Capability::WriteContent, Capability::Create, Capability::Delete]);
        }
    }

    fn create_file(&self, name: &FileName) -> VfsResult<Box<dyn FileBacking>> {
        Ok(Box::new(LocalFile {
            path: Self::host_path(name),
            meta: None,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct LocalFile {
    path: PathBuf,
    meta: Option<std::fs::Metadata>,
}

impl LocalFile {
    fn meta(&self, name: &FileName) -> VfsResult<&std::fs::Metadata> {
        self.meta
            .as_ref()
            .ok_or_else(|| VfsError::invalid_state(name.to_string(), "not attached"))
    }

    async fn ensure_parent(&self, name: &FileName) -> VfsResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(name, e))?;
        }
        Ok(())
    }
}

fn io_error(name: &FileName, e: io::Error) -> VfsError {
    if e.kind() == io::ErrorKind::NotFound {
        VfsError::not_found(name.to_string())
    } else {
        VfsError::access(name.to_string(), e)
    }
}

#[async_trait]
impl FileBacking for LocalFile {
    async fn attach(&mut self, cx: &FileContext<'_>) -> VfsResult<FileType> {
        // stat follows symlinks
        match fs::metadata(&self.path).await {
            Ok(meta) => {
                // Unix special files (sockets, pipes, devices) are classified as File.
                let kind = if meta.is_dir() { FileType::Folder } else { FileType::File };
                self.meta = Some(meta);
                Ok(kind)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileType::Imaginary),
            Err(e) => Err(VfsError::access(cx.name().to_string(), e)),
        }
    }

    async fn detach(&mut self) -> VfsResult<()> {
        self.meta = None;
        Ok(())
    }

    async fn list_child_names(&mut self, cx: &FileContext<'_>) -> VfsResult<Vec<String>> {
        let mut dir = fs::read_dir(&self.path).await.map_err(|e| io_error(cx.name(), e))?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(cx.name(), e))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn content_size(&mut self, cx: &FileContext<'_>) -> VfsResult<u64> {
        Ok(self.meta(cx.name())?.len())
    }

    async fn last_modified(&mut self, cx: &FileContext<'_>) -> VfsResult<Option<SystemTime>> {
        Ok(self.meta(cx.name())?.modified().ok())
    }

    async fn read_attributes(&mut self, cx: &FileContext<'_>) -> VfsResult<Attributes> {
        let meta = self.meta(cx.name())?;
        let mut attrs = Attributes::new();
        if let Some(mode) = LocalBackend::extract_permissions(meta) {
            attrs.insert("unix.mode".to_string(), AttrValue::from(format!("{:o}", mode & 0o7777)));
        }
        Ok(attrs)
    }

    async fn open_content_stream(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentReader> {
        let file = fs::File::open(&self.path).await.map_err(|e| io_error(cx.name(), e))?;
        Ok(Box::new(file))
    }

    async fn write_content(&mut self, cx: &FileContext<'_>, data: &[u8]) -> VfsResult<()> {
        self.ensure_parent(cx.name()).await?;
        fs::write(&self.path, data).await.map_err(|e| io_error(cx.name(), e))
    }

    async fn create_folder(&mut self, cx: &FileContext<'_>) -> VfsResult<()> {
        fs::create_dir_all(&self.path).await.map_err(|e| io_error(cx.name(), e))
    }

    async fn create_empty_file(&mut self, cx: &FileContext<'_>) -> VfsResult<()> {
        self.ensure_parent(cx.name()).await?;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
            .map(drop)
            .map_err(|e| io_error(cx.name(), e))
    }

    async fn delete(&mut self, cx: &FileContext<'_>) -> VfsResult<()> {
        let is_dir = self.meta(cx.name())?.is_dir();
        let result = if is_dir {
            fs::remove_dir(&self.path).await
        } else {
            fs::remove_file(&self.path).await
        };
        result.map_err(|e| io_error(cx.name(), e))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::manager::FileSystemManager;
    use crate::registry::ProviderRegistry;

    fn uri(dir: &std::path::Path, rel: &str) -> String {
        format!("file://{}/{}", dir.display(), rel)
    }

    fn manager(read_only: bool) -> FileSystemManager {
        let mut config = ManagerConfig::default();
        config.local.read_only = read_only;
        FileSystemManager::new(ProviderRegistry::with_defaults(), config)
    }

    #[test]
    fn test_host_path() {
        let name = FileName::hierarchical("file", "", vec!["tmp".into(), "a.txt".into()]).unwrap();
        assert_eq!(LocalBackend::host_path(&name), PathBuf::from("/tmp/a.txt"));
        assert_eq!(LocalBackend::host_path(&name.root()), PathBuf::from("/"));
    }

    #[test]
    fn test_read_only_drops_write_capabilities() {
        let mut caps = CapabilitySet::new();
        LocalBackend::read_only().add_capabilities(&mut caps);
        assert!(caps.is_read_only());
        assert!(caps.contains(Capability::ReadContent));

        let mut caps = CapabilitySet::new();
        LocalBackend::new().add_capabilities(&mut caps);
        assert!(caps.contains(Capability::Delete));
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = manager(false);

        let file = vfs.resolve_file(&uri(dir.path(), "a/b/c.txt")).await.unwrap();
        assert_eq!(file.get_type().await.unwrap(), FileType::Imaginary);

        file.write_content(b"nested").await.unwrap();
        assert_eq!(file.get_type().await.unwrap(), FileType::File);
        assert_eq!(file.content().read_to_string().await.unwrap(), "nested");
        assert_eq!(file.content().size().await.unwrap(), 6);
        assert!(file.content().last_modified().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeta"), b"z").unwrap();
        std::fs::write(dir.path().join("alpha"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("mid")).unwrap();

        let vfs = manager(false);
        let folder = vfs.resolve_file(&uri(dir.path(), "")).await.unwrap();
        assert_eq!(folder.get_type().await.unwrap(), FileType::Folder);
        let names: Vec<_> = folder
            .child_names()
            .await
            .unwrap()
            .iter()
            .map(|n| n.base_name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        let mid = folder.get_child("mid").await.unwrap().unwrap();
        assert!(mid.is_folder().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_then_delete_refreshes_parent() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = manager(false);
        let folder = vfs.resolve_file(&uri(dir.path(), "")).await.unwrap();
        assert!(folder.child_names().await.unwrap().is_empty());

        let sub = folder.resolve_file("sub", strata_types::NameScope::Child).await.unwrap();
        sub.create_folder().await.unwrap();
        assert!(sub.is_folder().await.unwrap());
        assert_eq!(folder.child_names().await.unwrap().len(), 1);

        let leaf = sub.resolve_file("leaf", strata_types::NameScope::Child).await.unwrap();
        leaf.create_file().await.unwrap();
        assert!(leaf.is_file().await.unwrap());
        assert_eq!(leaf.content().size().await.unwrap(), 0);

        leaf.delete().await.unwrap();
        sub.delete().await.unwrap();
        assert!(!sub.exists().await.unwrap());
        assert!(folder.child_names().await.unwrap().is_empty());
        assert!(matches!(sub.delete().await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_only_config_gates_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"data").unwrap();
        let vfs = manager(true);
        let file = vfs.resolve_file(&uri(dir.path(), "f")).await.unwrap();

        let err = file.write_content(b"x").await.unwrap_err();
        assert!(matches!(
            err,
            VfsError::UnsupportedCapability { capability: Capability::WriteContent, .. }
        ));
        assert!(matches!(file.delete().await, Err(VfsError::UnsupportedCapability { .. })));
        assert_eq!(file.content().read_to_end().await.unwrap(), b"data");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_mode_attribute() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let vfs = manager(false);
        let file = vfs.resolve_file(&uri(dir.path(), "f")).await.unwrap();
        let mode = file.content().attribute("unix.mode").await.unwrap().unwrap();
        assert_eq!(mode.first(), Some("640"));
    }
}
