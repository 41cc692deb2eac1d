//! File content access.
//!
//! At most one [`ContentStream`] is open per file object at a time. The
//! stream holds the object's reading flag and clears it when closed or
//! dropped, so a reader that goes away without closing never blocks the
//! next one.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;

use strata_types::{AttrValue, Attributes, ContentInfo};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::{VfsError, VfsResult};
use crate::object::FileObject;

/// Reader returned by backends.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Content accessors for one file object.
///
/// Every accessor attaches the object first and fails with
/// `InvalidState` when the type has no content.
#[derive(Debug, Clone, Copy)]
pub struct FileContent<'a> {
    file: &'a FileObject,
}

impl<'a> FileContent<'a> {
    pub(crate) fn new(file: &'a FileObject) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &'a FileObject {
        self.file
    }

    pub async fn size(&self) -> VfsResult<u64> {
        self.file.content_size().await
    }

    pub async fn last_modified(&self) -> VfsResult<Option<SystemTime>> {
        self.file.last_modified().await
    }

    pub async fn attributes(&self) -> VfsResult<Attributes> {
        self.file.attributes().await
    }

    pub async fn attribute(&self, name: &str) -> VfsResult<Option<AttrValue>> {
        self.file.attribute(name).await
    }

    pub async fn content_info(&self) -> VfsResult<ContentInfo> {
        self.file.content_info().await
    }

    /// Open the single reader for this object.
    pub async fn open_stream(&self) -> VfsResult<ContentStream> {
        self.file.open_stream().await
    }

    /// Returns true while a stream from this object is open.
    pub fn is_open(&self) -> bool {
        self.file.reading_flag().load(Ordering::Acquire)
    }

    /// Read the whole content.
    pub async fn read_to_end(&self) -> VfsResult<Vec<u8>> {
        self.open_stream().await?.read_all().await
    }

    /// Read the whole content as UTF-8.
    pub async fn read_to_string(&self) -> VfsResult<String> {
        let bytes = self.read_to_end().await?;
        String::from_utf8(bytes)
            .map_err(|e| VfsError::access(self.file.name().to_string(), e))
    }
}

/// Releases the reading flag on drop.
struct ReadGuard(Arc<AtomicBool>);

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An open reader over a file object's content.
pub struct ContentStream {
    name: String,
    reader: ContentReader,
    _guard: ReadGuard,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream").field("name", &self.name).finish()
    }
}

impl ContentStream {
    pub(crate) fn new(name: String, reader: ContentReader, flag: Arc<AtomicBool>) -> Self {
        Self {
            name,
            reader,
            _guard: ReadGuard(flag),
        }
    }

    /// URI of the file being read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drain the stream, then close it.
    pub async fn read_all(mut self) -> VfsResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| VfsError::access(self.name.clone(), e))?;
        Ok(buf)
    }

    /// Close the stream, freeing the object for the next reader.
    pub fn close(self) {}
}

impl AsyncRead for ContentStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}
