//! In-memory archive codec.
//!
//! [`ManifestCodec`] decodes manifest text (see [`crate::manifest`]) as if
//! it were archive bytes, and counts opens and closes.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use strata_kernel::providers::{ArchiveCodec, ArchiveEntry, ArchiveReader};

use crate::manifest::parse_manifest;

/// Open/close counters shared between a codec and its readers.
#[derive(Debug, Default)]
pub struct ArchiveCounters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
}

impl ArchiveCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Codec that reads manifest text.
#[derive(Debug, Default)]
pub struct ManifestCodec {
    modified: Option<SystemTime>,
    fail_close: bool,
    counters: Arc<ArchiveCounters>,
}

impl ManifestCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp every entry with `time`.
    pub fn with_modified(mut self, time: SystemTime) -> Self {
        self.modified = Some(time);
        self
    }

    /// Make every reader's close fail.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn counters(&self) -> Arc<ArchiveCounters> {
        self.counters.clone()
    }
}

impl ArchiveCodec for ManifestCodec {
    fn open(&self, bytes: Vec<u8>) -> io::Result<Arc<dyn ArchiveReader>> {
        let text = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let manifest = parse_manifest(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        let mut entries = Vec::with_capacity(manifest.len());
        let mut contents = HashMap::new();
        for entry in manifest {
            entries.push(ArchiveEntry {
                name: entry.name.clone(),
                is_dir: entry.is_dir,
                size: entry.content.len() as u64,
                modified: self.modified,
            });
            contents.insert(entry.name, entry.content);
        }

        Ok(Arc::new(MemoryArchive {
            entries,
            contents,
            fail_close: self.fail_close,
            counters: self.counters.clone(),
        }))
    }
}

/// An opened manifest.
#[derive(Debug)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
    contents: HashMap<String, Vec<u8>>,
    fail_close: bool,
    counters: Arc<ArchiveCounters>,
}

impl ArchiveReader for MemoryArchive {
    fn entries(&self) -> io::Result<Vec<ArchiveEntry>> {
        Ok(self.entries.clone())
    }

    fn read_entry(&self, name: &str) -> io::Result<Vec<u8>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.contents
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no entry {name}")))
    }

    fn close(&self) -> io::Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(io::Error::other("close failed"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_counts_and_reads() {
        let codec = ManifestCodec::new();
        let reader = codec.open(b"a/b.txt = hi\nd/\n".to_vec()).unwrap();
        assert_eq!(codec.counters().opens(), 1);

        let entries = reader.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size, 2);
        assert!(entries[1].is_dir);
        assert_eq!(reader.read_entry("a/b.txt").unwrap(), b"hi");
        assert!(reader.read_entry("nope").is_err());

        reader.close().unwrap();
        assert_eq!(codec.counters().closes(), 1);
    }

    #[test]
    fn open_rejects_non_manifest() {
        assert!(ManifestCodec::new().open(vec![0xff, 0xfe]).is_err());
    }
}
