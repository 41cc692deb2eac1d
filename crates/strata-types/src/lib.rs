//! strata-types: pure data types shared by every strata crate.
//!
//! Nothing here performs I/O. These are the vocabulary of the engine:
//!
//! - [`FileType`]: what a resolved name turned out to be
//! - [`Capability`] / [`CapabilitySet`]: what a file system supports
//! - [`NameScope`]: how far a relative resolution may range
//! - [`ContentInfo`] / [`AttrValue`]: content metadata facades

mod capability;
mod content;
mod file_type;
mod scope;

pub use capability::{Capability, CapabilitySet, ParseCapabilityError};
pub use content::{AttrValue, Attributes, ContentInfo};
pub use file_type::FileType;
pub use scope::NameScope;
