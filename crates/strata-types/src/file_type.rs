//! File type enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a resolved file.
///
/// Only known once a file object has attached. A detached object has no
/// type at all, which is different from [`FileType::Imaginary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// The name does not currently exist.
    Imaginary,
    /// Has content, no children.
    File,
    /// Has children, no content.
    Folder,
    /// Has both content and children (e.g. a multipart document part).
    FileOrFolder,
}

impl FileType {
    /// Returns true if the file can be read as content.
    pub fn has_content(&self) -> bool {
        matches!(self, FileType::File | FileType::FileOrFolder)
    }

    /// Returns true if the file can list children.
    pub fn has_children(&self) -> bool {
        matches!(self, FileType::Folder | FileType::FileOrFolder)
    }

    /// Returns true unless the type is [`FileType::Imaginary`].
    pub fn exists(&self) -> bool {
        !matches!(self, FileType::Imaginary)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Imaginary => "imaginary",
            FileType::File => "file",
            FileType::Folder => "folder",
            FileType::FileOrFolder => "file_or_folder",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
