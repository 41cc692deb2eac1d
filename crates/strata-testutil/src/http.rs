//! Scripted HTTP connections.
//!
//! [`FakeHttp`] answers from a fixed route table and counts every call, so
//! tests can assert how often the wire was touched.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use strata_kernel::providers::{HttpConnection, HttpConnectionManager, HttpOptions, HttpResponse};
use strata_kernel::{ContentReader, FileName};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Route {
    response: HttpResponse,
    body: Vec<u8>,
}

/// Call counters shared by a [`FakeHttp`] and every connection it opened.
#[derive(Debug, Default)]
pub struct HttpCounters {
    pub connects: AtomicUsize,
    pub gets: AtomicUsize,
    pub shutdowns: AtomicUsize,
    heads: Mutex<HashMap<String, usize>>,
}

impl HttpCounters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// HEAD requests sent for `path`.
    pub async fn heads(&self, path: &str) -> usize {
        self.heads.lock().await.get(path).copied().unwrap_or(0)
    }

    /// HEAD requests sent for any path.
    pub async fn total_heads(&self) -> usize {
        self.heads.lock().await.values().sum()
    }
}

/// Connection manager with a fixed route table. Unknown paths answer 404.
#[derive(Debug, Default)]
pub struct FakeHttp {
    routes: HashMap<String, Route>,
    counters: Arc<HttpCounters>,
    last_options: Mutex<Option<HttpOptions>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `path` with a 200 and a matching Content-Length.
    pub fn with_file(self, path: &str, body: impl Into<Vec<u8>>, headers: &[(&str, &str)]) -> Self {
        let body = body.into();
        let mut response = HttpResponse::new(200).with_header("Content-Length", body.len().to_string());
        for (name, value) in headers {
            response = response.with_header(*name, *value);
        }
        self.with_response(path, response, body)
    }

    /// Answer `path` with `response` and `body` verbatim.
    pub fn with_response(mut self, path: &str, response: HttpResponse, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                response,
                body: body.into(),
            },
        );
        self
    }

    /// Answer `path` with a bare status.
    pub fn with_status(self, path: &str, status: u16) -> Self {
        self.with_response(path, HttpResponse::new(status), Vec::new())
    }

    pub fn counters(&self) -> Arc<HttpCounters> {
        self.counters.clone()
    }

    /// Options passed to the most recent connect.
    pub async fn last_options(&self) -> Option<HttpOptions> {
        self.last_options.lock().await.clone()
    }
}

#[async_trait]
impl HttpConnectionManager for FakeHttp {
    async fn connect(&self, _root: &FileName, options: &HttpOptions) -> io::Result<Arc<dyn HttpConnection>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().await = Some(options.clone());
        Ok(Arc::new(FakeConnection {
            routes: self.routes.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct FakeConnection {
    routes: HashMap<String, Route>,
    counters: Arc<HttpCounters>,
}

#[async_trait]
impl HttpConnection for FakeConnection {
    async fn head(&self, path: &str) -> io::Result<HttpResponse> {
        *self.counters.heads.lock().await.entry(path.to_string()).or_default() += 1;
        Ok(self
            .routes
            .get(path)
            .map(|route| route.response.clone())
            .unwrap_or_else(|| HttpResponse::new(404)))
    }

    async fn get(&self, path: &str) -> io::Result<ContentReader> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        let route = self
            .routes
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("404 {path}")))?;
        Ok(Box::new(io::Cursor::new(route.body.clone())))
    }

    async fn shutdown(&self) -> io::Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_and_counters() {
        let http = FakeHttp::new().with_file("/a.txt", "hello", &[("Content-Type", "text/plain")]);
        let root = FileName::hierarchical("http", "example.com", Vec::new()).unwrap();
        let options = HttpOptions {
            user_agent: "test".into(),
            timeout: std::time::Duration::from_secs(1),
        };
        let conn = http.connect(&root, &options).await.unwrap();

        let head = conn.head("/a.txt").await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.header("content-length"), Some("5"));
        assert_eq!(conn.head("/missing").await.unwrap().status, 404);

        let counters = http.counters();
        assert_eq!(counters.heads("/a.txt").await, 1);
        assert_eq!(counters.total_heads().await, 2);
        assert_eq!(counters.connects(), 1);
        assert_eq!(http.last_options().await, Some(options));
    }
}
