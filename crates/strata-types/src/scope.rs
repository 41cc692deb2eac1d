//! Name resolution scopes.

use serde::{Deserialize, Serialize};

/// Constraint on how far a relative resolution may range from its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameScope {
    /// Anywhere within the base's file system.
    #[default]
    FileSystem,
    /// A single direct child of the base.
    Child,
    /// Strictly inside the base's subtree.
    Descendent,
    /// Inside the base's subtree, or the base itself.
    DescendentOrSelf,
}
