//! File system capabilities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A named operation category a file system declares support for.
///
/// Capabilities form a flat set, not a hierarchy: `WriteContent` does not
/// imply `ReadContent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    ReadContent,
    WriteContent,
    Attributes,
    LastModified,
    Signing,
    Create,
    Delete,
    ListChildren,
    Uri,
    FsAttributes,
    Junctions,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 11] = [
        Capability::ReadContent,
        Capability::WriteContent,
        Capability::Attributes,
        Capability::LastModified,
        Capability::Signing,
        Capability::Create,
        Capability::Delete,
        Capability::ListChildren,
        Capability::Uri,
        Capability::FsAttributes,
        Capability::Junctions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadContent => "READ_CONTENT",
            Capability::WriteContent => "WRITE_CONTENT",
            Capability::Attributes => "ATTRIBUTE",
            Capability::LastModified => "LAST_MODIFIED",
            Capability::Signing => "SIGNING",
            Capability::Create => "CREATE",
            Capability::Delete => "DELETE",
            Capability::ListChildren => "LIST_CHILDREN",
            Capability::Uri => "URI",
            Capability::FsAttributes => "FS_ATTRIBUTE",
            Capability::Junctions => "JUNCTIONS",
        }
    }

    /// Returns true for capabilities that change stored state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Capability::WriteContent | Capability::Create | Capability::Delete
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a capability name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability: {0}")]
pub struct ParseCapabilityError(pub String);

impl FromStr for Capability {
    type Err = ParseCapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseCapabilityError(s.to_string()))
    }
}

/// An immutable-once-built set of capabilities.
///
/// File systems assemble their set once at construction and hand out
/// shared references afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    caps: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cap: Capability) -> bool {
        self.caps.insert(cap)
    }

    pub fn remove(&mut self, cap: Capability) -> bool {
        self.caps.remove(&cap)
    }

    pub fn extend(&mut self, caps: impl IntoIterator<Item = Capability>) {
        self.caps.extend(caps);
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.caps.contains(&cap)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.caps.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// Returns true if no mutating capability is present.
    pub fn is_read_only(&self) -> bool {
        !self.caps.iter().any(Capability::is_mutating)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            caps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.caps.iter().map(Capability::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!("FLY".parse::<Capability>().is_err());
    }

    #[test]
    fn test_attribute_names_match_legacy_spelling() {
        assert_eq!(Capability::Attributes.to_string(), "ATTRIBUTE");
        assert_eq!(Capability::FsAttributes.to_string(), "FS_ATTRIBUTE");
    }

    #[test]
    fn test_read_only_detection() {
        let ro: CapabilitySet = [Capability::ReadContent, Capability::ListChildren]
            .into_iter()
            .collect();
        assert!(ro.is_read_only());

        let mut rw = ro.clone();
        rw.insert(Capability::Delete);
        assert!(!rw.is_read_only());
        assert_eq!(rw.len(), 3);
    }

    #[test]
    fn test_display_is_sorted() {
        let set: CapabilitySet = [Capability::Uri, Capability::ReadContent].into_iter().collect();
        assert_eq!(set.to_string(), "[READ_CONTENT, URI]");
    }
}
