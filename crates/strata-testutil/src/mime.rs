//! Document fixtures.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_kernel::providers::{DocumentParser, Part};

/// Parser that ignores its input and returns a fixed tree.
#[derive(Debug)]
pub struct FixedParser {
    document: Mutex<Part>,
    parses: Arc<AtomicUsize>,
}

impl FixedParser {
    pub fn new(document: Part) -> Self {
        Self {
            document: Mutex::new(document),
            parses: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return `document` from later parses, as if the file had changed.
    pub fn replace(&self, document: Part) {
        if let Ok(mut current) = self.document.lock() {
            *current = document;
        }
    }

    /// Shared parse counter.
    pub fn parses(&self) -> Arc<AtomicUsize> {
        self.parses.clone()
    }
}

impl DocumentParser for FixedParser {
    fn parse(&self, _bytes: &[u8]) -> io::Result<Part> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let document = self
            .document
            .lock()
            .map_err(|_| io::Error::other("document lock poisoned"))?;
        Ok(document.clone())
    }
}

/// A mail message with three parts: `a.txt`, an unnamed part carrying a
/// forwarded message, and `b.txt`.
pub fn sample_message() -> Part {
    let forwarded = Part::leaf("forwarded body")
        .with_header("Content-Type", "text/plain; charset=us-ascii")
        .with_header("Subject", "fwd");

    Part::multipart(
        "This is a multi-part message in MIME format.",
        vec![
            Part::leaf("alpha")
                .with_file_name("a.txt")
                .with_header("Content-Type", "text/plain"),
            Part::nested(forwarded).with_header("Content-Type", "message/rfc822"),
            Part::leaf("bravo")
                .with_file_name("b.txt")
                .with_header("Content-Type", "text/plain; charset=ISO-8859-1"),
        ],
    )
    .with_header("Content-Type", "multipart/mixed; boundary=xyz")
    .with_header("Date", "Tue, 15 Nov 1994 08:12:31 +0000")
    .with_header("Received", "from relay-1")
    .with_header("Received", "from relay-2")
}
