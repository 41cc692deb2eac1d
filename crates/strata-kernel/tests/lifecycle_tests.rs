//! File object lifecycle, cache identity and file system teardown.
//!
//! Uses a scripted backend so attach timing and failures are under test
//! control, plus the local backend for the cache-identity checks.

use std::any::Any;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strata_kernel::{
    AttachState, Capability, CapabilitySet, ContentReader, FileBacking, FileContext, FileName, FileSystem,
    FileSystemBackend, FileType, ManagerConfig, NameScope, VfsError, VfsResult,
};
use strata_testutil::{file_uri, Fixtures};

#[derive(Clone, Default)]
struct Script {
    attaches: Arc<AtomicUsize>,
    detaches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    fail_first: usize,
    delay: Duration,
}

struct ScriptedBackend(Script);

#[async_trait]
impl FileSystemBackend for ScriptedBackend {
    fn add_capabilities(&self, caps: &mut CapabilitySet) {
        caps.extend([Capability::ReadContent, Capability::Uri]);
    }

    fn create_file(&self, _name: &FileName) -> VfsResult<Box<dyn FileBacking>> {
        Ok(Box::new(ScriptedFile(self.0.clone())))
    }

    async fn close_communication_link(&self) -> VfsResult<()> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ScriptedFile(Script);

#[async_trait]
impl FileBacking for ScriptedFile {
    async fn attach(&mut self, cx: &FileContext<'_>) -> VfsResult<FileType> {
        let n = self.0.attaches.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.0.delay.is_zero() {
            tokio::time::sleep(self.0.delay).await;
        }
        if n <= self.0.fail_first {
            return Err(VfsError::invalid_state(cx.name().to_string(), "flaky backend"));
        }
        Ok(FileType::File)
    }

    async fn detach(&mut self) -> VfsResult<()> {
        self.0.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn content_size(&mut self, _cx: &FileContext<'_>) -> VfsResult<u64> {
        Ok(4)
    }

    async fn open_content_stream(&mut self, _cx: &FileContext<'_>) -> VfsResult<ContentReader> {
        Ok(Box::new(Cursor::new(b"data".to_vec())))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn test_root() -> FileName {
    FileName::hierarchical("test", "", Vec::new()).unwrap()
}

async fn scripted(script: Script) -> Arc<FileSystem> {
    FileSystem::open(test_root(), ScriptedBackend(script)).await.unwrap()
}

// ============================================================================
// Cache identity
// ============================================================================

#[tokio::test]
async fn test_resolving_twice_returns_the_same_object() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("b")).unwrap();
    let vfs = Fixtures::new().manager(ManagerConfig::default());

    let base = file_uri(dir.path());
    let first = vfs.resolve_file(&format!("{base}/b")).await.unwrap();
    let second = vfs.resolve_file(&format!("{base}/./b")).await.unwrap();
    let third = vfs.resolve_file(&format!("{base}/b/")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));

    let parent = first.get_parent().await.unwrap().unwrap();
    let listed = parent.get_child("b").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &listed));
}

#[tokio::test]
async fn test_relative_resolution_through_manager() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
    let vfs = Fixtures::new().manager(ManagerConfig::default());

    let b = vfs.resolve_file(&file_uri(&dir.path().join("a/b"))).await.unwrap();
    let a = vfs.resolve_relative(&b, "..", NameScope::FileSystem).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b.get_parent().await.unwrap().unwrap()));

    let elsewhere = vfs
        .resolve_relative(&b, &file_uri(dir.path()), NameScope::FileSystem)
        .await
        .unwrap();
    assert!(elsewhere.is_folder().await.unwrap());

    assert!(matches!(
        vfs.resolve_relative(&b, "..", NameScope::Descendent).await,
        Err(VfsError::InvalidName { .. })
    ));
}

#[tokio::test]
async fn test_invalidate_replaces_the_object() {
    let fs = scripted(Script::default()).await;
    let name = test_root().child("x").unwrap();

    let first = fs.resolve_file(&name).await.unwrap();
    assert!(fs.invalidate(&name).await.is_some());
    let second = fs.resolve_file(&name).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_refresh_keeps_the_object_cached() {
    let script = Script::default();
    let fs = scripted(script.clone()).await;
    let name = test_root().child("x").unwrap();

    let file = fs.resolve_file(&name).await.unwrap();
    assert_eq!(file.attach_state().await, AttachState::Detached);
    file.get_type().await.unwrap();
    assert_eq!(file.attach_state().await, AttachState::Attached(FileType::File));

    file.refresh().await;
    assert!(!file.is_attached().await);
    assert!(Arc::ptr_eq(&file, &fs.resolve_file(&name).await.unwrap()));

    file.get_type().await.unwrap();
    assert_eq!(script.attaches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_foreign_name_is_rejected() {
    let fs = scripted(Script::default()).await;
    let other = FileName::hierarchical("file", "", vec!["x".into()]).unwrap();
    assert!(matches!(fs.resolve_file(&other).await, Err(VfsError::InvalidName { .. })));
}

// ============================================================================
// Attach state machine
// ============================================================================

#[tokio::test]
async fn test_failed_attach_reverts_to_detached() {
    let script = Script {
        fail_first: 1,
        ..Script::default()
    };
    let fs = scripted(script.clone()).await;
    let file = fs.resolve_path("/flaky").await.unwrap();

    let err = file.get_type().await.unwrap_err();
    assert!(matches!(err, VfsError::Access { .. }), "{err:?}");
    assert_eq!(file.attach_state().await, AttachState::Detached);

    assert_eq!(file.get_type().await.unwrap(), FileType::File);
    assert_eq!(script.attaches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_attach_reverts_to_detached() {
    let script = Script {
        delay: Duration::from_secs(60),
        ..Script::default()
    };
    let fs = scripted(script).await;
    let file = fs.resolve_path("/slow").await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(20), file.get_type()).await;
    assert!(result.is_err(), "attach should still be pending");
    assert_eq!(file.attach_state().await, AttachState::Detached);
}

#[tokio::test]
async fn test_concurrent_attach_calls_backend_once() {
    let script = Script {
        delay: Duration::from_millis(20),
        ..Script::default()
    };
    let fs = scripted(script.clone()).await;
    let file = fs.resolve_path("/shared").await.unwrap();

    let (a, b) = tokio::join!(file.get_type(), file.get_type());
    assert_eq!(a.unwrap(), FileType::File);
    assert_eq!(b.unwrap(), FileType::File);
    assert_eq!(script.attaches.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Content streams
// ============================================================================

#[tokio::test]
async fn test_second_stream_fails_until_first_is_closed() {
    let fs = scripted(Script::default()).await;
    let file = fs.resolve_path("/f").await.unwrap();

    let first = file.content().open_stream().await.unwrap();
    assert!(file.content().is_open());
    let err = file.content().open_stream().await.unwrap_err();
    assert!(matches!(err, VfsError::InvalidState { .. }), "{err:?}");

    first.close();
    assert!(!file.content().is_open());
    let second = file.content().open_stream().await.unwrap();
    assert_eq!(second.read_all().await.unwrap(), b"data");

    // Dropping without close frees the object too.
    drop(file.content().open_stream().await.unwrap());
    assert_eq!(file.content().read_to_end().await.unwrap(), b"data");
}

#[tokio::test]
async fn test_missing_capability_fails_before_backend() {
    let script = Script::default();
    let fs = scripted(script.clone()).await;
    let file = fs.resolve_path("/f").await.unwrap();

    let err = file.get_children().await.unwrap_err();
    assert!(matches!(
        err,
        VfsError::UnsupportedCapability { capability: Capability::ListChildren, .. }
    ));
    assert!(matches!(
        file.content().attributes().await,
        Err(VfsError::UnsupportedCapability { capability: Capability::Attributes, .. })
    ));
    assert!(matches!(
        file.content().last_modified().await,
        Err(VfsError::UnsupportedCapability { capability: Capability::LastModified, .. })
    ));
    assert!(matches!(
        file.delete().await,
        Err(VfsError::UnsupportedCapability { capability: Capability::Delete, .. })
    ));
    assert_eq!(script.attaches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_folder_and_imaginary_have_no_content() {
    let dir = tempfile::tempdir().unwrap();
    let vfs = Fixtures::new().manager(ManagerConfig::default());
    let folder = vfs.resolve_file(&file_uri(dir.path())).await.unwrap();
    let missing = folder.resolve_file("missing", NameScope::Child).await.unwrap();

    assert!(matches!(folder.content().size().await, Err(VfsError::InvalidState { .. })));
    assert!(matches!(folder.content().open_stream().await, Err(VfsError::InvalidState { .. })));
    assert!(matches!(missing.content().size().await, Err(VfsError::InvalidState { .. })));
    assert!(matches!(missing.content().content_info().await, Err(VfsError::InvalidState { .. })));
    assert!(matches!(missing.require_exists().await, Err(VfsError::NotFound(_))));
    assert!(missing.content().attributes().await.unwrap().is_empty());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_close_twice_tears_down_once() {
    let script = Script::default();
    let fs = scripted(script.clone()).await;
    fs.resolve_path("/a").await.unwrap();

    fs.close().await;
    fs.close().await;
    assert_eq!(script.closes.load(Ordering::SeqCst), 1);
    assert_eq!(fs.cache_len().await, 0);
    assert!(fs.is_closed());
}

#[tokio::test]
async fn test_operations_after_close_report_connection_closed() {
    let fs = scripted(Script::default()).await;
    let file = fs.resolve_path("/a").await.unwrap();
    fs.close().await;

    assert!(fs.resolve_path("/b").await.unwrap_err().is_connection_closed());
    assert!(file.get_type().await.unwrap_err().is_connection_closed());
}

#[tokio::test]
async fn test_close_during_attach_fails_the_attach() {
    let script = Script {
        delay: Duration::from_millis(100),
        ..Script::default()
    };
    let fs = scripted(script.clone()).await;
    let file = fs.resolve_path("/a").await.unwrap();

    let pending = tokio::spawn({
        let file = file.clone();
        async move { file.get_type().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    fs.close().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_connection_closed(), "{err:?}");
    assert_eq!(file.attach_state().await, AttachState::Detached);
    assert_eq!(script.detaches.load(Ordering::SeqCst), 1);
}
