//! Structured-document backend.
//!
//! A parsed [`Part`] tree is exposed as a file tree. The root binds to the
//! whole document; every other object binds by asking its parent for the
//! sub-part with its base name:
//!
//! ```text
//! mime:file:///mail.eml!/                 root part (multipart)
//! mime:file:///mail.eml!/report.pdf       part declaring file name "report.pdf"
//! mime:file:///mail.eml!/part-1           second part, no declared name
//! mime:file:///mail.eml!/part-1/_content  the message nested inside part-1
//! ```
//!
//! Declared names are escaped into one segment: `report/2024.pdf` lists as
//! `report%2F2024.pdf` and `..` as `%2E%2E`. An empty declared name counts
//! as no name.
//!
//! Containers are both files and folders: their content is the multipart
//! preamble, or the nested part's body.

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use strata_types::{AttrValue, Attributes, Capability, CapabilitySet, ContentInfo, FileType};

use super::http::parse_http_date;
use super::{blocking, require_inner};
use crate::content::ContentReader;
use crate::content_info::{charset_param, media_type, ContentInfoFactory, DEFAULT_ENCODING};
use crate::error::{VfsError, VfsResult};
use crate::filesystem::{FileSystem, FileSystemBackend};
use crate::name::{decode_segment, FileName};
use crate::object::{FileBacking, FileContext, FileObject};
use crate::registry::{FileProvider, ProviderContext, SchemeKind};

/// Prefix for parts without a declared file name.
pub const UNNAMED_PART_PREFIX: &str = "part-";

/// Name of the sole child of a part whose content is another part.
pub const NESTED_CONTENT_NAME: &str = "_content";

/// One node of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Headers in document order.
    pub headers: Vec<(String, String)>,
    /// Declared file name, e.g. from `Content-Disposition`.
    pub file_name: Option<String>,
    pub body: PartBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// Decoded body bytes.
    Leaf(Vec<u8>),
    /// A multipart container.
    Multipart { preamble: String, parts: Vec<Arc<Part>> },
    /// A part whose content is another part, e.g. `message/rfc822`.
    Nested(Arc<Part>),
}

impl Part {
    pub fn leaf(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Vec::new(),
            file_name: None,
            body: PartBody::Leaf(body.into()),
        }
    }

    pub fn multipart(preamble: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            headers: Vec::new(),
            file_name: None,
            body: PartBody::Multipart {
                preamble: preamble.into(),
                parts: parts.into_iter().map(Arc::new).collect(),
            },
        }
    }

    pub fn nested(part: Part) -> Self {
        Self {
            headers: Vec::new(),
            file_name: None,
            body: PartBody::Nested(Arc::new(part)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn declared_name(&self) -> Option<&str> {
        self.file_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn file_type(&self) -> FileType {
        match self.body {
            PartBody::Leaf(_) => FileType::File,
            PartBody::Multipart { .. } | PartBody::Nested(_) => FileType::FileOrFolder,
        }
    }

    /// Child names in declaration order.
    pub fn child_names(&self) -> Vec<String> {
        match &self.body {
            PartBody::Leaf(_) => Vec::new(),
            PartBody::Multipart { parts, .. } => parts
                .iter()
                .enumerate()
                .map(|(idx, part)| match part.declared_name() {
                    Some(name) => part_segment(name),
                    None => format!("{UNNAMED_PART_PREFIX}{idx}"),
                })
                .collect(),
            PartBody::Nested(_) => vec![NESTED_CONTENT_NAME.to_string()],
        }
    }

    /// The sub-part addressed by `name`, if any.
    ///
    /// `part-<n>` addresses the n-th part of a multipart by position;
    /// otherwise `name` is unescaped and matched against declared file
    /// names.
    pub fn find_child(&self, name: &str) -> Option<Arc<Part>> {
        match &self.body {
            PartBody::Leaf(_) => None,
            PartBody::Multipart { parts, .. } => {
                let by_index = name
                    .strip_prefix(UNNAMED_PART_PREFIX)
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .and_then(|idx| parts.get(idx));
                by_index
                    .or_else(|| {
                        let declared = decode_segment(name).ok()?;
                        parts.iter().find(|p| p.declared_name() == Some(declared.as_str()))
                    })
                    .cloned()
            }
            PartBody::Nested(inner) => (name == NESTED_CONTENT_NAME).then(|| inner.clone()),
        }
    }

    /// The bytes this part reads as.
    pub fn content_bytes(&self) -> &[u8] {
        match &self.body {
            PartBody::Leaf(bytes) => bytes,
            PartBody::Multipart { preamble, .. } => preamble.as_bytes(),
            PartBody::Nested(inner) => inner.content_bytes(),
        }
    }

    /// Headers as attributes; repeated headers keep every value in order.
    pub fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        for (name, value) in &self.headers {
            attrs
                .entry(name.clone())
                .and_modify(|existing: &mut AttrValue| existing.push(value.clone()))
                .or_insert_with(|| AttrValue::from(value.as_str()));
        }
        attrs
    }
}

/// Escape a declared part name into a single path segment.
fn part_segment(name: &str) -> String {
    match name {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => {
            let mut segment = String::with_capacity(name.len());
            for c in name.chars() {
                match c {
                    '%' => segment.push_str("%25"),
                    '/' => segment.push_str("%2F"),
                    '\0' => segment.push_str("%00"),
                    c => segment.push(c),
                }
            }
            segment
        }
    }
}

/// Parses raw document bytes into a part tree. May block.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> io::Result<Part>;
}

/// Content info from a part's `Content-Type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeContentInfoFactory;

impl ContentInfoFactory<Part> for MimeContentInfoFactory {
    fn create(&self, part: &Part) -> ContentInfo {
        let header = part.header("Content-Type");
        let content_type = header.and_then(media_type).map(str::to_string);
        let encoding = header.and_then(charset_param).unwrap_or(DEFAULT_ENCODING);
        ContentInfo::new(content_type, encoding)
    }
}

/// Provider for document schemes.
#[derive(Clone)]
pub struct MimeProvider {
    parser: Arc<dyn DocumentParser>,
}

impl MimeProvider {
    pub fn new(parser: Arc<dyn DocumentParser>) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl FileProvider for MimeProvider {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Layered
    }

    async fn create_file_system(&self, root: FileName, cx: ProviderContext<'_>) -> VfsResult<Arc<FileSystem>> {
        let inner = require_inner(&root, &cx)?;
        FileSystem::open(root, MimeBackend::new(inner, self.parser.clone())).await
    }
}

/// Backend over one document file.
pub struct MimeBackend {
    inner: Arc<FileObject>,
    parser: Arc<dyn DocumentParser>,
}

impl MimeBackend {
    pub fn new(inner: Arc<FileObject>, parser: Arc<dyn DocumentParser>) -> Self {
        Self { inner, parser }
    }

    /// The document file this backend reads.
    pub fn inner(&self) -> &Arc<FileObject> {
        &self.inner
    }

    /// Read and parse the document. `None` when the inner file is absent.
    pub async fn open_root(&self) -> VfsResult<Option<Arc<Part>>> {
        if !self.inner.exists().await? {
            return Ok(None);
        }
        let bytes = self.inner.content().read_to_end().await?;
        let parser = self.parser.clone();
        let part = blocking(self.inner.name(), move || parser.parse(&bytes)).await?;
        tracing::debug!(document = %self.inner.name(), "parsed document");
        Ok(Some(Arc::new(part)))
    }
}

#[async_trait]
impl FileSystemBackend for MimeBackend {
    fn add_capabilities(&self, caps: &mut CapabilitySet) {
        caps.extend([
            Capability::ReadContent,
            Capability::Attributes,
            Capability::LastModified,
            Capability::ListChildren,
            Capability::Uri,
        ]);
    }

    fn create_file(&self, _name: &FileName) -> VfsResult<Box<dyn FileBacking>> {
        Ok(Box::new(MimeFile::default()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-object state: the bound part, if any.
#[derive(Default)]
struct MimeFile {
    part: Option<Arc<Part>>,
    attributes: Option<Attributes>,
}

impl MimeFile {
    fn set_part(&mut self, part: Option<Arc<Part>>) {
        self.part = part;
        self.attributes = None;
    }

    fn part(&self, name: &FileName) -> VfsResult<&Arc<Part>> {
        self.part
            .as_ref()
            .ok_or_else(|| VfsError::invalid_state(name.to_string(), "no part bound"))
    }

    fn find_part(&self, name: &str) -> Option<Arc<Part>> {
        self.part.as_ref().and_then(|part| part.find_child(name))
    }
}

#[async_trait]
impl FileBacking for MimeFile {
    async fn attach(&mut self, cx: &FileContext<'_>) -> VfsResult<FileType> {
        let part = if cx.is_root() {
            let backend = cx
                .file_system()
                .backend_as::<MimeBackend>()
                .ok_or_else(|| VfsError::invalid_state(cx.name().to_string(), "not a document file system"))?;
            backend.open_root().await?
        } else {
            let parent = cx
                .parent()
                .await?
                .ok_or_else(|| VfsError::invalid_state(cx.name().to_string(), "no parent"))?;
            let base = cx.name().base_name().to_string();
            parent
                .with_attached_backing::<MimeFile, _>(|_, parent| parent.find_part(&base))
                .await?
        };
        let kind = part.as_ref().map_or(FileType::Imaginary, |p| p.file_type());
        self.set_part(part);
        Ok(kind)
    }

    async fn detach(&mut self) -> VfsResult<()> {
        self.set_part(None);
        Ok(())
    }

    async fn list_child_names(&mut self, cx: &FileContext<'_>) -> VfsResult<Vec<String>> {
        Ok(self.part(cx.name())?.child_names())
    }

    async fn content_size(&mut self, cx: &FileContext<'_>) -> VfsResult<u64> {
        Ok(self.part(cx.name())?.content_bytes().len() as u64)
    }

    async fn last_modified(&mut self, cx: &FileContext<'_>) -> VfsResult<Option<SystemTime>> {
        if let Some(date) = self.part(cx.name())?.header("Date").and_then(parse_http_date) {
            return Ok(Some(date));
        }
        match cx.parent().await? {
            Some(parent) => parent.content().last_modified().await,
            None => Ok(None),
        }
    }

    async fn read_attributes(&mut self, cx: &FileContext<'_>) -> VfsResult<Attributes> {
        if self.attributes.is_none() {
            self.attributes = Some(self.part(cx.name())?.attributes());
        }
        Ok(self.attributes.clone().unwrap_or_default())
    }

    async fn content_info(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentInfo> {
        Ok(MimeContentInfoFactory.create(self.part(cx.name())?))
    }

    async fn open_content_stream(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentReader> {
        let bytes = self.part(cx.name())?.content_bytes().to_vec();
        Ok(Box::new(io::Cursor::new(bytes)))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Part {
        Part::multipart(
            "This is a multi-part message.",
            vec![
                Part::leaf("first").with_file_name("a.txt"),
                Part::leaf("second"),
                Part::leaf("third").with_file_name("b.txt"),
            ],
        )
    }

    #[test]
    fn test_child_names_fill_unnamed_parts() {
        assert_eq!(sample().child_names(), vec!["a.txt", "part-1", "b.txt"]);
        assert_eq!(Part::nested(Part::leaf("x")).child_names(), vec!["_content"]);
        assert!(Part::leaf("x").child_names().is_empty());
    }

    #[test]
    fn test_find_child() {
        let doc = sample();
        assert_eq!(doc.find_child("part-1").unwrap().content_bytes(), b"second");
        assert_eq!(doc.find_child("b.txt").unwrap().content_bytes(), b"third");
        assert_eq!(doc.find_child("part-0").unwrap().content_bytes(), b"first");
        assert!(doc.find_child("part-9").is_none());
        assert!(doc.find_child("nope").is_none());

        let nested = Part::nested(Part::leaf("inner"));
        assert_eq!(nested.find_child("_content").unwrap().content_bytes(), b"inner");
        assert!(nested.find_child("part-0").is_none());
    }

    #[test]
    fn test_declared_names_become_single_segments() {
        let doc = Part::multipart(
            "",
            vec![
                Part::leaf("r").with_file_name("report/2024.pdf"),
                Part::leaf("up").with_file_name(".."),
                Part::leaf("pct").with_file_name("50%.txt"),
                Part::leaf("blank").with_file_name(""),
            ],
        );
        let names = doc.child_names();
        assert_eq!(names, vec!["report%2F2024.pdf", "%2E%2E", "50%25.txt", "part-3"]);
        let bodies: Vec<_> = names
            .iter()
            .map(|n| doc.find_child(n).unwrap().content_bytes().to_vec())
            .collect();
        assert_eq!(bodies, [b"r".to_vec(), b"up".to_vec(), b"pct".to_vec(), b"blank".to_vec()]);
    }

    #[test]
    fn test_content_bytes() {
        assert_eq!(sample().content_bytes(), b"This is a multi-part message.");
        assert_eq!(Part::nested(Part::leaf("body")).content_bytes(), b"body");
    }

    #[test]
    fn test_attributes_keep_repeated_headers() {
        let part = Part::leaf("x")
            .with_header("Received", "from a")
            .with_header("Subject", "hi")
            .with_header("Received", "from b");
        let attrs = part.attributes();
        assert_eq!(
            attrs.get("Received"),
            Some(&AttrValue::Multi(vec!["from a".into(), "from b".into()]))
        );
        assert_eq!(attrs.get("Subject"), Some(&AttrValue::Single("hi".into())));
    }

    #[test]
    fn test_content_info() {
        let part = Part::leaf("x").with_header("content-type", "text/plain; charset=us-ascii");
        let info = MimeContentInfoFactory.create(&part);
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(info.content_encoding, "us-ascii");
        assert_eq!(MimeContentInfoFactory.create(&Part::leaf("x")).content_encoding, "UTF-8");
    }
}
