//! Content metadata facades.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Content type and encoding derived by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    /// Media type, e.g. `text/plain`. `None` when the backend cannot tell.
    pub content_type: Option<String>,
    /// Character encoding, e.g. `UTF-8`.
    pub content_encoding: String,
}

impl ContentInfo {
    pub fn new(content_type: Option<String>, content_encoding: impl Into<String>) -> Self {
        Self {
            content_type,
            content_encoding: content_encoding.into(),
        }
    }
}

/// One attribute value: a single string or an ordered sequence.
///
/// Headers that repeat (e.g. `Received`) keep every value in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttrValue {
    /// The first value.
    pub fn first(&self) -> Option<&str> {
        match self {
            AttrValue::Single(v) => Some(v),
            AttrValue::Multi(vs) => vs.first().map(String::as_str),
        }
    }

    /// All values, in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            AttrValue::Single(v) => vec![v.as_str()],
            AttrValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    /// Append a value, promoting a single value to a sequence.
    pub fn push(&mut self, value: impl Into<String>) {
        let value = value.into();
        match self {
            AttrValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = AttrValue::Multi(vec![first, value]);
            }
            AttrValue::Multi(vs) => vs.push(value),
        }
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Single(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Single(v.to_string())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Single(v) => f.write_str(v),
            AttrValue::Multi(vs) => f.write_str(&vs.join(", ")),
        }
    }
}

/// Attribute map: name → value(s).
pub type Attributes = BTreeMap<String, AttrValue>;
