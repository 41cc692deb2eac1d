//! HTTP backend.
//!
//! Each file system holds exactly one connection, opened through an
//! [`HttpConnectionManager`] when the file system opens and shut down once
//! when it closes. Each file object issues a single HEAD on attach and
//! answers every metadata question from that response.

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use strata_types::{AttrValue, Attributes, Capability, CapabilitySet, ContentInfo, FileType};
use tokio::sync::RwLock;

use crate::config::HttpConfig;
use crate::content::ContentReader;
use crate::content_info::{charset_param, media_type, ContentInfoFactory};
use crate::error::{VfsError, VfsResult};
use crate::filesystem::{FileSystem, FileSystemBackend};
use crate::name::FileName;
use crate::object::{FileBacking, FileContext};
use crate::registry::{FileProvider, ProviderContext, SchemeKind};

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Headers in wire order. Names compare case-insensitively.
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// Builder-style header append.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    /// Every value of header `name`, in order.
    pub fn header_values<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-connection options derived from [`HttpConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    pub user_agent: String,
    pub timeout: Duration,
}

impl From<&HttpConfig> for HttpOptions {
    fn from(config: &HttpConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// One client shared by every object of a file system.
#[async_trait]
pub trait HttpConnection: Send + Sync {
    /// Send a HEAD for `path`, already percent-encoded.
    async fn head(&self, path: &str) -> io::Result<HttpResponse>;

    /// Send a GET for `path` and stream the body.
    async fn get(&self, path: &str) -> io::Result<ContentReader>;

    /// Release the client.
    async fn shutdown(&self) -> io::Result<()>;
}

/// Creates the connection for a file system root.
#[async_trait]
pub trait HttpConnectionManager: Send + Sync {
    async fn connect(&self, root: &FileName, options: &HttpOptions) -> io::Result<Arc<dyn HttpConnection>>;
}

/// Provider for `http` and `https`.
#[derive(Clone)]
pub struct HttpProvider {
    connections: Arc<dyn HttpConnectionManager>,
}

impl HttpProvider {
    pub fn new(connections: Arc<dyn HttpConnectionManager>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl FileProvider for HttpProvider {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Hierarchical
    }

    async fn create_file_system(&self, root: FileName, cx: ProviderContext<'_>) -> VfsResult<Arc<FileSystem>> {
        let backend = HttpBackend::new(root.root(), self.connections.clone(), &cx.config.http);
        FileSystem::open(root, backend).await
    }
}

/// Backend over one HTTP origin.
pub struct HttpBackend {
    root: FileName,
    connections: Arc<dyn HttpConnectionManager>,
    options: HttpOptions,
    content_info: HttpContentInfoFactory,
    client: RwLock<Option<Arc<dyn HttpConnection>>>,
}

impl HttpBackend {
    pub fn new(root: FileName, connections: Arc<dyn HttpConnectionManager>, config: &HttpConfig) -> Self {
        Self {
            root,
            connections,
            options: HttpOptions::from(config),
            content_info: HttpContentInfoFactory::new(config.default_charset.clone()),
            client: RwLock::new(None),
        }
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// The shared client, or a connection-closed error after close.
    async fn client(&self, name: &FileName) -> VfsResult<Arc<dyn HttpConnection>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| VfsError::connection_closed(name.to_string()))
    }

    async fn head(&self, name: &FileName) -> VfsResult<HttpResponse> {
        let client = self.client(name).await?;
        let path = name.encoded_path();
        match tokio::time::timeout(self.options.timeout, client.head(&path)).await {
            Ok(result) => result.map_err(|e| VfsError::access(name.to_string(), e)),
            Err(elapsed) => Err(VfsError::access(name.to_string(), elapsed)),
        }
    }

    async fn get(&self, name: &FileName) -> VfsResult<ContentReader> {
        let client = self.client(name).await?;
        let path = name.encoded_path();
        match tokio::time::timeout(self.options.timeout, client.get(&path)).await {
            Ok(result) => result.map_err(|e| VfsError::access(name.to_string(), e)),
            Err(elapsed) => Err(VfsError::access(name.to_string(), elapsed)),
        }
    }
}

#[async_trait]
impl FileSystemBackend for HttpBackend {
    fn add_capabilities(&self, caps: &mut CapabilitySet) {
        caps.extend([
            Capability::ReadContent,
            Capability::Attributes,
            Capability::LastModified,
            Capability::Uri,
        ]);
    }

    fn create_file(&self, _name: &FileName) -> VfsResult<Box<dyn FileBacking>> {
        Ok(Box::new(HttpFile { response: None }))
    }

    async fn create_connection(&self) -> VfsResult<()> {
        let client = self
            .connections
            .connect(&self.root, &self.options)
            .await
            .map_err(|e| VfsError::access(self.root.to_string(), e))?;
        *self.client.write().await = Some(client);
        tracing::debug!(root = %self.root, "opened http connection");
        Ok(())
    }

    async fn close_communication_link(&self) -> VfsResult<()> {
        let client = self.client.write().await.take();
        if let Some(client) = client {
            client
                .shutdown()
                .await
                .map_err(|e| VfsError::access(self.root.to_string(), e))?;
            tracing::debug!(root = %self.root, "shut down http connection");
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-object state: the memoized HEAD response.
struct HttpFile {
    response: Option<HttpResponse>,
}

impl HttpFile {
    fn response(&self, name: &FileName) -> VfsResult<&HttpResponse> {
        self.response
            .as_ref()
            .ok_or_else(|| VfsError::invalid_state(name.to_string(), "not attached"))
    }
}

fn backend<'a>(cx: &'a FileContext<'_>) -> VfsResult<&'a HttpBackend> {
    cx.file_system()
        .backend_as::<HttpBackend>()
        .ok_or_else(|| VfsError::invalid_state(cx.name().to_string(), "not an http file system"))
}

#[async_trait]
impl FileBacking for HttpFile {
    async fn attach(&mut self, cx: &FileContext<'_>) -> VfsResult<FileType> {
        let response = backend(cx)?.head(cx.name()).await?;
        let kind = match response.status {
            200..=299 => FileType::File,
            404 | 410 => FileType::Imaginary,
            status => {
                return Err(VfsError::access(
                    cx.name().to_string(),
                    format!("HEAD returned status {status}"),
                ));
            }
        };
        self.response = Some(response);
        Ok(kind)
    }

    async fn detach(&mut self) -> VfsResult<()> {
        self.response = None;
        Ok(())
    }

    async fn content_size(&mut self, cx: &FileContext<'_>) -> VfsResult<u64> {
        let response = self.response(cx.name())?;
        let value = response
            .header("Content-Length")
            .ok_or_else(|| VfsError::access(cx.name().to_string(), "response has no Content-Length"))?;
        value
            .trim()
            .parse::<u64>()
            .map_err(|e| VfsError::access(cx.name().to_string(), e))
    }

    async fn last_modified(&mut self, cx: &FileContext<'_>) -> VfsResult<Option<SystemTime>> {
        let response = self.response(cx.name())?;
        Ok(response.header("Last-Modified").and_then(parse_http_date))
    }

    async fn read_attributes(&mut self, cx: &FileContext<'_>) -> VfsResult<Attributes> {
        let response = self.response(cx.name())?;
        let mut attrs = Attributes::new();
        for (name, value) in &response.headers {
            attrs
                .entry(name.clone())
                .and_modify(|existing: &mut AttrValue| existing.push(value.clone()))
                .or_insert_with(|| AttrValue::from(value.as_str()));
        }
        Ok(attrs)
    }

    async fn content_info(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentInfo> {
        let response = self.response(cx.name())?;
        Ok(backend(cx)?.content_info.create(response))
    }

    async fn open_content_stream(&mut self, cx: &FileContext<'_>) -> VfsResult<ContentReader> {
        backend(cx)?.get(cx.name()).await
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Parse an RFC 2822 date as used by `Last-Modified` and `Date`.
pub(crate) fn parse_http_date(value: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(SystemTime::from)
}

/// Content info from the first `Content-Type` header.
#[derive(Debug, Clone)]
pub struct HttpContentInfoFactory {
    default_charset: String,
}

impl HttpContentInfoFactory {
    pub fn new(default_charset: impl Into<String>) -> Self {
        Self {
            default_charset: default_charset.into(),
        }
    }
}

impl ContentInfoFactory<HttpResponse> for HttpContentInfoFactory {
    fn create(&self, response: &HttpResponse) -> ContentInfo {
        let header = response.header("Content-Type");
        let content_type = header.and_then(media_type).map(str::to_string);
        let encoding = header
            .and_then(charset_param)
            .unwrap_or(self.default_charset.as_str())
            .to_string();
        ContentInfo::new(content_type, encoding)
    }
}
