//! File objects and their attach/detach lifecycle.
//!
//! A [`FileObject`] is created DETACHED by its file system on a cache miss.
//! The first operation that needs to know what the name refers to attaches
//! it, calling into the backend's [`FileBacking`]:
//!
//! ```text
//! Detached ──attach──▶ Attaching ──ok──▶ Attached(type)
//!     ▲                    │                  │
//!     └──── error/drop ────┘                  │
//!     └──────────────── refresh/close ────────┘
//! ```
//!
//! The object's state lives behind an async mutex held across the attach
//! call, so concurrent callers wait for one backend attach instead of
//! racing into a second one.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use strata_types::{AttrValue, Attributes, Capability, ContentInfo, FileType, NameScope};
use tokio::sync::{Mutex, MutexGuard};

use crate::content::{ContentReader, ContentStream, FileContent};
use crate::content_info::{ContentInfoFactory, DefaultContentInfoFactory};
use crate::error::{VfsError, VfsResult};
use crate::filesystem::FileSystem;
use crate::name::FileName;

/// Where an object is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    Attaching,
    Attached(FileType),
}

/// What a backing hook can see of the object it serves.
pub struct FileContext<'a> {
    name: &'a FileName,
    fs: &'a Arc<FileSystem>,
}

impl<'a> FileContext<'a> {
    pub(crate) fn new(name: &'a FileName, fs: &'a Arc<FileSystem>) -> Self {
        Self { name, fs }
    }

    pub fn name(&self) -> &FileName {
        self.name
    }

    pub fn file_system(&self) -> &Arc<FileSystem> {
        self.fs
    }

    pub fn is_root(&self) -> bool {
        self.name.is_root()
    }

    /// The parent object, resolved through the file system cache.
    pub async fn parent(&self) -> VfsResult<Option<Arc<FileObject>>> {
        match self.name.parent() {
            Some(parent) => self.fs.resolve_file(&parent).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Per-object backend hooks.
///
/// Each backend stores whatever it binds to (an archive entry, a HEAD
/// response, a document part) inside its implementation of this trait.
/// The engine memoizes every result, so hooks are called at most once per
/// attach cycle.
#[async_trait]
pub trait FileBacking: Send + 'static {
    /// Bind to the backing resource and report its type.
    async fn attach(&mut self, cx: &FileContext<'_>) -> VfsResult<FileType>;

    /// Release the backing resource.
    async fn detach(&mut self) -> VfsResult<()> {
        Ok(())
    }

    /// Base names of the children, in backend order.
    async fn list_child_names(&mut self, cx: &FileContext<'_>) -> VfsResult<Vec<String>> {
        let _ = cx;
        Ok(Vec::new())
    }

    /// Content length in bytes.
    async fn content_size(&mut self, cx: &FileContext<'_>) -> VfsResult<u64>;

    /// Last modification time, if the backend knows it.
    async fn last_modified(&mut self, cx: &FileContext<'_>) -> VfsResult<Option<SystemTime>> {
        let _ = cx;
        Ok(None)
    }

    /// Backend attributes.
    async fn read_attributes(&mut self, cx: &FileContext<'_>) -> VfsResult<Attributes> {
        let _ = cx;
        Ok(Attributes::new())
    }

    /// Content type and encoding.
    async fn content_info(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentInfo> {
        Ok(DefaultContentInfoFactory.create(cx.name()))
    }

    /// Open a reader over the content.
    async fn open_content_stream(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentReader>;

    /// Replace the content with `data`, creating the file if needed.
    async fn write_content(&mut self, cx: &FileContext<'_>, data: &[u8]) -> VfsResult<()> {
        let _ = data;
        Err(VfsError::unsupported(cx.name().to_string(), Capability::WriteContent))
    }

    /// Create this name as a folder.
    async fn create_folder(&mut self, cx: &FileContext<'_>) -> VfsResult<()> {
        Err(VfsError::unsupported(cx.name().to_string(), Capability::Create))
    }

    /// Create this name as an empty file.
    async fn create_empty_file(&mut self, cx: &FileContext<'_>) -> VfsResult<()> {
        Err(VfsError::unsupported(cx.name().to_string(), Capability::Create))
    }

    /// Delete this file or empty folder.
    async fn delete(&mut self, cx: &FileContext<'_>) -> VfsResult<()> {
        Err(VfsError::unsupported(cx.name().to_string(), Capability::Delete))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct ObjectState {
    attach: AttachState,
    backing: Box<dyn FileBacking>,
    children: Option<Vec<FileName>>,
    size: Option<u64>,
    last_modified: Option<Option<SystemTime>>,
    attributes: Option<Attributes>,
    content_info: Option<ContentInfo>,
}

impl ObjectState {
    fn clear_memo(&mut self) {
        self.children = None;
        self.size = None;
        self.last_modified = None;
        self.attributes = None;
        self.content_info = None;
    }
}

/// Flips an attach slot back to Detached unless the attach completed.
///
/// Covers both backend errors and futures dropped mid-attach.
struct AttachGuard<'a> {
    slot: &'a mut AttachState,
    done: bool,
}

impl<'a> AttachGuard<'a> {
    fn begin(slot: &'a mut AttachState) -> Self {
        *slot = AttachState::Attaching;
        Self { slot, done: false }
    }

    fn finish(mut self, kind: FileType) {
        *self.slot = AttachState::Attached(kind);
        self.done = true;
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            *self.slot = AttachState::Detached;
        }
    }
}

/// A lazily attached handle to one addressed resource.
///
/// Owned by its file system's cache; callers share it through `Arc`.
pub struct FileObject {
    name: FileName,
    fs: Weak<FileSystem>,
    state: Mutex<ObjectState>,
    reading: Arc<AtomicBool>,
}

impl std::fmt::Debug for FileObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObject")
            .field("name", &self.name.to_string())
            .field("reading", &self.reading.load(Ordering::Relaxed))
            .finish()
    }
}

impl FileObject {
    pub(crate) fn new(name: FileName, fs: Weak<FileSystem>, backing: Box<dyn FileBacking>) -> Self {
        Self {
            name,
            fs,
            state: Mutex::new(ObjectState {
                attach: AttachState::Detached,
                backing,
                children: None,
                size: None,
                last_modified: None,
                attributes: None,
                content_info: None,
            }),
            reading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &FileName {
        &self.name
    }

    /// The owning file system, unless it has been closed or dropped.
    pub fn file_system(&self) -> VfsResult<Arc<FileSystem>> {
        match self.fs.upgrade() {
            Some(fs) if !fs.is_closed() => Ok(fs),
            _ => Err(VfsError::connection_closed(self.name.to_string())),
        }
    }

    /// Current lifecycle state. Waits for an in-flight attach.
    pub async fn attach_state(&self) -> AttachState {
        self.state.lock().await.attach
    }

    pub async fn is_attached(&self) -> bool {
        matches!(self.attach_state().await, AttachState::Attached(_))
    }

    /// Type of the file, attaching first if needed.
    pub async fn get_type(&self) -> VfsResult<FileType> {
        let fs = self.file_system()?;
        let (_, kind) = self.attached(&fs).await?;
        Ok(kind)
    }

    pub async fn exists(&self) -> VfsResult<bool> {
        Ok(self.get_type().await?.exists())
    }

    pub async fn is_file(&self) -> VfsResult<bool> {
        Ok(self.get_type().await? == FileType::File)
    }

    pub async fn is_folder(&self) -> VfsResult<bool> {
        Ok(self.get_type().await? == FileType::Folder)
    }

    /// Type of the file, or [`VfsError::NotFound`] when it is imaginary.
    pub async fn require_exists(&self) -> VfsResult<FileType> {
        match self.get_type().await? {
            FileType::Imaginary => Err(VfsError::not_found(self.name.to_string())),
            kind => Ok(kind),
        }
    }

    /// Parent object, `None` at the root.
    pub async fn get_parent(&self) -> VfsResult<Option<Arc<FileObject>>> {
        let fs = self.file_system()?;
        match self.name.parent() {
            Some(parent) => fs.resolve_file(&parent).await.map(Some),
            None => Ok(None),
        }
    }

    /// Resolve `path` relative to this object.
    pub async fn resolve_file(&self, path: &str, scope: NameScope) -> VfsResult<Arc<FileObject>> {
        let fs = self.file_system()?;
        let name = self.name.resolve(path, scope)?;
        fs.resolve_file(&name).await
    }

    /// Names of the children, listing them on first call.
    pub async fn child_names(&self) -> VfsResult<Vec<FileName>> {
        let fs = self.file_system()?;
        fs.require(Capability::ListChildren, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        if !kind.has_children() {
            return Err(VfsError::invalid_state(
                self.name.to_string(),
                format!("cannot list children of a {kind}"),
            ));
        }
        if let Some(children) = &state.children {
            return Ok(children.clone());
        }

        let cx = FileContext::new(&self.name, &fs);
        let names = state.backing.list_child_names(&cx).await?;
        let children = names
            .iter()
            .map(|n| self.name.resolve(n, NameScope::Child))
            .collect::<VfsResult<Vec<_>>>()?;
        state.children = Some(children.clone());
        Ok(children)
    }

    /// Child objects, each resolved through the file system cache.
    pub async fn get_children(&self) -> VfsResult<Vec<Arc<FileObject>>> {
        let names = self.child_names().await?;
        let fs = self.file_system()?;
        let mut children = Vec::with_capacity(names.len());
        for name in &names {
            children.push(fs.resolve_file(name).await?);
        }
        Ok(children)
    }

    /// The listed child with base name `name`, if any.
    pub async fn get_child(&self, name: &str) -> VfsResult<Option<Arc<FileObject>>> {
        let names = self.child_names().await?;
        match names.iter().find(|n| n.base_name() == name) {
            Some(child) => self.file_system()?.resolve_file(child).await.map(Some),
            None => Ok(None),
        }
    }

    /// Content accessors.
    pub fn content(&self) -> FileContent<'_> {
        FileContent::new(self)
    }

    /// Replace the content. Creates the file when imaginary.
    pub async fn write_content(&self, data: &[u8]) -> VfsResult<()> {
        let fs = self.file_system()?;
        fs.require(Capability::WriteContent, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        if kind == FileType::Folder {
            return Err(VfsError::invalid_state(self.name.to_string(), "cannot write to a folder"));
        }
        let cx = FileContext::new(&self.name, &fs);
        state.backing.write_content(&cx, data).await?;
        self.after_mutation(&fs, state).await;
        Ok(())
    }

    /// Create this name as a folder. A no-op if it already is one.
    pub async fn create_folder(&self) -> VfsResult<()> {
        let fs = self.file_system()?;
        fs.require(Capability::Create, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        match kind {
            FileType::Folder => Ok(()),
            FileType::Imaginary => {
                let cx = FileContext::new(&self.name, &fs);
                state.backing.create_folder(&cx).await?;
                self.after_mutation(&fs, state).await;
                Ok(())
            }
            other => Err(VfsError::invalid_state(
                self.name.to_string(),
                format!("already exists as a {other}"),
            )),
        }
    }

    /// Create this name as an empty file. A no-op if it already is one.
    pub async fn create_file(&self) -> VfsResult<()> {
        let fs = self.file_system()?;
        fs.require(Capability::Create, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        match kind {
            FileType::File => Ok(()),
            FileType::Imaginary => {
                let cx = FileContext::new(&self.name, &fs);
                state.backing.create_empty_file(&cx).await?;
                self.after_mutation(&fs, state).await;
                Ok(())
            }
            other => Err(VfsError::invalid_state(
                self.name.to_string(),
                format!("already exists as a {other}"),
            )),
        }
    }

    /// Delete this file or empty folder.
    pub async fn delete(&self) -> VfsResult<()> {
        let fs = self.file_system()?;
        fs.require(Capability::Delete, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        if kind == FileType::Imaginary {
            return Err(VfsError::not_found(self.name.to_string()));
        }
        let cx = FileContext::new(&self.name, &fs);
        state.backing.delete(&cx).await?;
        self.after_mutation(&fs, state).await;
        Ok(())
    }

    /// Detach and forget everything memoized. The object stays cached.
    pub async fn refresh(&self) {
        let mut state = self.state.lock().await;
        self.detach_locked(&mut state).await;
    }

    /// Release the backing resource. Same as [`refresh`](Self::refresh).
    pub async fn close(&self) {
        self.refresh().await;
    }

    /// Run `f` against this object's backing without attaching.
    ///
    /// Fails with `InvalidState` if the backing is not a `T`.
    pub async fn with_backing<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> VfsResult<R>
    where
        T: FileBacking,
    {
        let mut state = self.state.lock().await;
        let backing = state
            .backing
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| VfsError::invalid_state(self.name.to_string(), "unexpected backing type"))?;
        Ok(f(backing))
    }

    /// Attach, then run `f` against the backing while still holding the
    /// object's lock.
    pub async fn with_attached_backing<T, R>(&self, f: impl FnOnce(FileType, &mut T) -> R) -> VfsResult<R>
    where
        T: FileBacking,
    {
        let fs = self.file_system()?;
        let (mut state, kind) = self.attached(&fs).await?;
        let backing = state
            .backing
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| VfsError::invalid_state(self.name.to_string(), "unexpected backing type"))?;
        Ok(f(kind, backing))
    }

    /// Lock the state and make sure the object is attached.
    async fn attached(&self, fs: &Arc<FileSystem>) -> VfsResult<(MutexGuard<'_, ObjectState>, FileType)> {
        let mut state = self.state.lock().await;
        let kind = self.ensure_attached(fs, &mut state).await?;
        Ok((state, kind))
    }

    async fn ensure_attached(&self, fs: &Arc<FileSystem>, state: &mut ObjectState) -> VfsResult<FileType> {
        if let AttachState::Attached(kind) = state.attach {
            return Ok(kind);
        }
        if fs.is_closed() {
            return Err(VfsError::connection_closed(self.name.to_string()));
        }

        let cx = FileContext::new(&self.name, fs);
        let ObjectState { attach, backing, .. } = state;
        let guard = AttachGuard::begin(attach);
        let kind = backing
            .attach(&cx)
            .await
            .map_err(|e| e.into_access(self.name.to_string()))?;
        if fs.is_closed() {
            // Closed while the backend call was in flight.
            if let Err(e) = backing.detach().await {
                tracing::warn!(name = %self.name, error = %e, "detach after close failed");
            }
            return Err(VfsError::connection_closed(self.name.to_string()));
        }
        guard.finish(kind);
        tracing::debug!(name = %self.name, %kind, "attached");
        Ok(kind)
    }

    async fn detach_locked(&self, state: &mut ObjectState) {
        if let AttachState::Attached(_) = state.attach {
            if let Err(e) = state.backing.detach().await {
                tracing::warn!(name = %self.name, error = %e, "detach failed");
            }
            tracing::debug!(name = %self.name, "detached");
        }
        state.attach = AttachState::Detached;
        state.clear_memo();
    }

    /// Forget this object's state and its parent's cached child list.
    async fn after_mutation(&self, fs: &Arc<FileSystem>, mut state: MutexGuard<'_, ObjectState>) {
        self.detach_locked(&mut state).await;
        drop(state);
        if let Some(parent) = self.name.parent() {
            if let Some(parent) = fs.get_file(&parent).await {
                parent.refresh().await;
            }
        }
    }

    pub(crate) fn reading_flag(&self) -> &Arc<AtomicBool> {
        &self.reading
    }

    pub(crate) async fn content_size(&self) -> VfsResult<u64> {
        let fs = self.file_system()?;
        let (mut state, kind) = self.attached(&fs).await?;
        self.require_content(kind, "size")?;
        if let Some(size) = state.size {
            return Ok(size);
        }
        let cx = FileContext::new(&self.name, &fs);
        let size = state.backing.content_size(&cx).await?;
        state.size = Some(size);
        Ok(size)
    }

    pub(crate) async fn last_modified(&self) -> VfsResult<Option<SystemTime>> {
        let fs = self.file_system()?;
        fs.require(Capability::LastModified, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        self.require_content(kind, "last-modified time")?;
        if let Some(modified) = state.last_modified {
            return Ok(modified);
        }
        let cx = FileContext::new(&self.name, &fs);
        let modified = state.backing.last_modified(&cx).await?;
        state.last_modified = Some(modified);
        Ok(modified)
    }

    pub(crate) async fn attributes(&self) -> VfsResult<Attributes> {
        let fs = self.file_system()?;
        fs.require(Capability::Attributes, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        if kind == FileType::Imaginary {
            return Ok(Attributes::new());
        }
        if let Some(attrs) = &state.attributes {
            return Ok(attrs.clone());
        }
        let cx = FileContext::new(&self.name, &fs);
        let attrs = state.backing.read_attributes(&cx).await?;
        state.attributes = Some(attrs.clone());
        Ok(attrs)
    }

    pub(crate) async fn attribute(&self, name: &str) -> VfsResult<Option<AttrValue>> {
        Ok(self.attributes().await?.remove(name))
    }

    pub(crate) async fn content_info(&self) -> VfsResult<ContentInfo> {
        let fs = self.file_system()?;
        let (mut state, kind) = self.attached(&fs).await?;
        self.require_content(kind, "content info")?;
        if let Some(info) = &state.content_info {
            return Ok(info.clone());
        }
        let cx = FileContext::new(&self.name, &fs);
        let info = state.backing.content_info(&cx).await?;
        state.content_info = Some(info.clone());
        Ok(info)
    }

    pub(crate) async fn open_stream(&self) -> VfsResult<ContentStream> {
        let fs = self.file_system()?;
        fs.require(Capability::ReadContent, &self.name)?;
        let (mut state, kind) = self.attached(&fs).await?;
        self.require_content(kind, "content")?;

        if self
            .reading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VfsError::invalid_state(
                self.name.to_string(),
                "a content stream is already open",
            ));
        }

        let cx = FileContext::new(&self.name, &fs);
        match state.backing.open_content_stream(&cx).await {
            Ok(reader) => Ok(ContentStream::new(self.name.to_string(), reader, self.reading.clone())),
            Err(e) => {
                self.reading.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn require_content(&self, kind: FileType, what: &str) -> VfsResult<()> {
        if kind.has_content() {
            Ok(())
        } else {
            Err(VfsError::invalid_state(
                self.name.to_string(),
                format!("a {kind} has no {what}"),
            ))
        }
    }
}
