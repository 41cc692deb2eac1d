//! Hierarchical, possibly layered, file names.
//!
//! A [`FileName`] is a scheme, a root, and an absolute sequence of path
//! segments. The root is either an authority (`http://host:8080`) or a
//! nested inner name for layered schemes:
//!
//! ```text
//! file:///tmp/photos.zip                 scheme=file  root=""           segments=[tmp, photos.zip]
//! zip:file:///tmp/photos.zip!/a/b.jpg    scheme=zip   root=<file name>  segments=[a, b.jpg]
//! ```
//!
//! Names are immutable; every operation returns a new name. Equality and
//! hashing cover scheme, root and segments. The type hint derived from a
//! trailing `/` does not participate.
//!
//! Segments hold decoded text. The URI form percent-escapes `%`, `!` and a
//! few other characters, so `Hi!.txt` prints as `Hi%21.txt` and a layered
//! name still splits at its last `!`.

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};

use strata_types::{FileType, NameScope};

use crate::error::{VfsError, VfsResult};

/// Separator between an inner name and the path within a layered name.
pub const LAYER_SEPARATOR: char = '!';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Root {
    Authority(String),
    Layered(Box<FileName>),
}

/// A normalized hierarchical address.
#[derive(Debug, Clone)]
pub struct FileName {
    scheme: String,
    root: Root,
    segments: Vec<String>,
    hint: Option<FileType>,
}

impl PartialEq for FileName {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.root == other.root && self.segments == other.segments
    }
}

impl Eq for FileName {}

impl Hash for FileName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.root.hash(state);
        self.segments.hash(state);
    }
}

impl FileName {
    /// Create a name rooted at an authority.
    pub fn hierarchical(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        segments: Vec<String>,
    ) -> VfsResult<Self> {
        let name = Self {
            scheme: scheme.into().to_ascii_lowercase(),
            root: Root::Authority(authority.into()),
            segments,
            hint: None,
        };
        name.validate()?;
        Ok(name)
    }

    /// Create a name layered over `inner`.
    pub fn layered(scheme: impl Into<String>, inner: FileName, segments: Vec<String>) -> VfsResult<Self> {
        let name = Self {
            scheme: scheme.into().to_ascii_lowercase(),
            root: Root::Layered(Box::new(inner)),
            segments,
            hint: None,
        };
        name.validate()?;
        Ok(name)
    }

    fn validate(&self) -> VfsResult<()> {
        if !is_valid_scheme(&self.scheme) {
            return Err(VfsError::invalid_name(self.to_string(), "invalid scheme"));
        }
        for segment in &self.segments {
            check_segment(segment).map_err(|reason| VfsError::invalid_name(self.to_string(), reason))?;
        }
        Ok(())
    }

    /// Attach a type hint.
    pub fn with_type_hint(mut self, hint: Option<FileType>) -> Self {
        self.hint = hint;
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The authority, for hierarchical names.
    pub fn authority(&self) -> Option<&str> {
        match &self.root {
            Root::Authority(a) => Some(a),
            Root::Layered(_) => None,
        }
    }

    /// The wrapped inner name, for layered names.
    pub fn inner(&self) -> Option<&FileName> {
        match &self.root {
            Root::Authority(_) => None,
            Root::Layered(inner) => Some(inner),
        }
    }

    pub fn is_layered(&self) -> bool {
        matches!(self.root, Root::Layered(_))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Type hint derived from the textual form (`Folder` for a trailing `/`).
    pub fn type_hint(&self) -> Option<FileType> {
        self.hint
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `""` for the root.
    pub fn base_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Extension of the base name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let base = self.base_name();
        match base.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&base[idx + 1..]),
        }
    }

    /// Absolute path within the file system, e.g. `/a/b`.
    pub fn path(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            let mut path = String::new();
            for segment in &self.segments {
                path.push('/');
                path.push_str(segment);
            }
            path
        }
    }

    /// Absolute path with each segment percent-encoded, as it appears in
    /// the URI.
    pub fn encoded_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            push_encoded(&mut path, segment);
        }
        path
    }

    /// The root name of the file system this name lives in.
    pub fn root(&self) -> FileName {
        Self {
            scheme: self.scheme.clone(),
            root: self.root.clone(),
            segments: Vec::new(),
            hint: Some(FileType::Folder),
        }
    }

    /// Parent name, `None` at the root.
    pub fn parent(&self) -> Option<FileName> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self {
            scheme: self.scheme.clone(),
            root: self.root.clone(),
            segments,
            hint: Some(FileType::Folder),
        })
    }

    /// Direct child with the given base name.
    pub fn child(&self, name: &str) -> VfsResult<FileName> {
        check_segment(name).map_err(|reason| VfsError::invalid_name(name, reason))?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self {
            scheme: self.scheme.clone(),
            root: self.root.clone(),
            segments,
            hint: None,
        })
    }

    /// Returns true if both names live under the same file system root.
    pub fn same_root(&self, other: &FileName) -> bool {
        self.scheme == other.scheme && self.root == other.root
    }

    /// Returns true if `other` is strictly inside this name's subtree.
    pub fn is_ancestor_of(&self, other: &FileName) -> bool {
        self.same_root(other)
            && other.segments.len() > self.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    /// Resolve `path` against this name under `scope`.
    ///
    /// A leading `/` makes `path` absolute within this name's root. `.`
    /// and `..` are normalized; climbing above the root is an error.
    pub fn resolve(&self, path: &str, scope: NameScope) -> VfsResult<FileName> {
        if scope == NameScope::Child {
            if path.contains('/') {
                return Err(VfsError::invalid_name(path, "child name must be a single segment"));
            }
            return self.child(path);
        }

        let (base, relative) = match path.strip_prefix('/') {
            Some(rest) => (&[][..], rest),
            None => (self.segments.as_slice(), path),
        };
        let segments = normalize_segments(base, relative).map_err(|reason| VfsError::invalid_name(path, reason))?;
        let hint = if path.ends_with('/') { Some(FileType::Folder) } else { None };
        let resolved = Self {
            scheme: self.scheme.clone(),
            root: self.root.clone(),
            segments,
            hint,
        };

        match scope {
            NameScope::Descendent if !self.is_ancestor_of(&resolved) => Err(VfsError::invalid_name(
                path,
                format!("must be a descendent of {self}"),
            )),
            NameScope::DescendentOrSelf if resolved != *self && !self.is_ancestor_of(&resolved) => {
                Err(VfsError::invalid_name(path, format!("must be {self} or a descendent")))
            }
            _ => Ok(resolved),
        }
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Root::Authority(authority) => write!(f, "{}://{}{}", self.scheme, authority, self.encoded_path()),
            Root::Layered(inner) => {
                write!(f, "{}:{}{}{}", self.scheme, inner, LAYER_SEPARATOR, self.encoded_path())
            }
        }
    }
}

/// Scheme syntax: a letter followed by letters, digits, `+`, `-` or `.`.
pub(crate) fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn check_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        Err("empty path segment")
    } else if segment == "." || segment == ".." {
        Err("relative segment not allowed here")
    } else if segment.contains('/') {
        Err("segment contains a separator")
    } else if segment.contains('\0') {
        Err("segment contains a NUL byte")
    } else {
        Ok(())
    }
}

fn escaped(c: char) -> bool {
    matches!(c, '%' | '!' | '#' | '?' | ' ') || c.is_control()
}

fn push_encoded(out: &mut String, segment: &str) {
    let mut buf = [0u8; 4];
    for c in segment.chars() {
        if escaped(c) {
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(c);
        }
    }
}

/// Decode `%XX` escapes. A `%` not followed by two hex digits is kept.
pub(crate) fn decode_segment(text: &str) -> Result<String, &'static str> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escape = match bytes.get(i + 1..i + 3) {
            Some(hex) if bytes[i] == b'%' && hex.iter().all(u8::is_ascii_hexdigit) => std::str::from_utf8(hex)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok()),
            _ => None,
        };
        match escape {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| "percent escape is not valid UTF-8")
}

/// Apply a `/`-separated relative path to `base`, resolving `.` and `..`.
fn normalize_segments(base: &[String], relative: &str) -> Result<Vec<String>, &'static str> {
    normalize_parts(base, relative.split('/'))
}

/// Apply already-split path parts to `base`, resolving `.` and `..`.
pub(crate) fn normalize_parts<'a>(
    base: &[String],
    parts: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, &'static str> {
    let mut segments = base.to_vec();
    for part in parts {
        match part {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err("path escapes the file system root");
                }
            }
            other => {
                check_segment(other)?;
                segments.push(other.to_string());
            }
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn root() -> FileName {
        FileName::hierarchical("file", "", Vec::new()).unwrap()
    }

    fn name(path: &str) -> FileName {
        root().resolve(path, NameScope::FileSystem).unwrap()
    }

    #[test]
    fn test_display_hierarchical() {
        assert_eq!(root().to_string(), "file:///");
        assert_eq!(name("/a/b.txt").to_string(), "file:///a/b.txt");
        let http = FileName::hierarchical("HTTP", "example.com:8080", vec!["x".into()]).unwrap();
        assert_eq!(http.to_string(), "http://example.com:8080/x");
    }

    #[test]
    fn test_display_layered() {
        let inner = name("/tmp/a.zip");
        let outer = FileName::layered("zip", inner, vec!["dir".into(), "f.txt".into()]).unwrap();
        assert_eq!(outer.to_string(), "zip:file:///tmp/a.zip!/dir/f.txt");
        assert_eq!(outer.root().to_string(), "zip:file:///tmp/a.zip!/");
        assert!(outer.is_layered());
        assert_eq!(outer.inner().map(|n| n.path()), Some("/tmp/a.zip".to_string()));
    }

    #[test]
    fn test_display_escapes_segments() {
        let inner = root().child("a!b.zip").unwrap();
        let outer = FileName::layered("zip", inner, vec!["Hi!.txt".into(), "100% done".into()]).unwrap();
        assert_eq!(outer.to_string(), "zip:file:///a%21b.zip!/Hi%21.txt/100%25%20done");
        assert_eq!(outer.path(), "/Hi!.txt/100% done");
    }

    #[rstest]
    #[case::plain("abc", "abc")]
    #[case::bang("Hi%21.txt", "Hi!.txt")]
    #[case::lower_hex("a%2fb", "a/b")]
    #[case::stray_percent("100%", "100%")]
    #[case::bad_hex("%zz", "%zz")]
    #[case::signed("%+1", "%+1")]
    #[case::utf8("caf%C3%A9", "caf\u{e9}")]
    fn test_decode_segment(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(decode_segment(input).unwrap(), expected);
    }

    #[test]
    fn test_decode_rejects_broken_utf8() {
        assert!(decode_segment("%C3").is_err());
    }

    #[test]
    fn test_parent_and_child() {
        let n = name("/a/b/c");
        assert_eq!(n.parent().unwrap(), name("/a/b"));
        assert_eq!(n.base_name(), "c");
        assert_eq!(root().parent(), None);
        assert_eq!(name("/a").child("b").unwrap(), name("/a/b"));
        assert!(name("/a").child("..").is_err());
        assert!(name("/a").child("").is_err());
    }

    #[test]
    fn test_hint_excluded_from_equality() {
        let a = name("/a/");
        let b = name("/a");
        assert_eq!(a.type_hint(), Some(FileType::Folder));
        assert_eq!(b.type_hint(), None);
        assert_eq!(a, b);
    }

    #[rstest]
    #[case::dot("/a/./b", "/a/b")]
    #[case::dotdot("/a/x/../b", "/a/b")]
    #[case::double_slash("//a//b", "/a/b")]
    #[case::relative("c", "/base/c")]
    #[case::relative_up("../c", "/c")]
    #[case::empty("", "/base")]
    fn test_resolve_file_system_scope(#[case] input: &str, #[case] expected: &str) {
        let base = name("/base");
        assert_eq!(base.resolve(input, NameScope::FileSystem).unwrap().path(), expected);
    }

    #[test]
    fn test_resolve_escape_fails() {
        let err = name("/a").resolve("../../x", NameScope::FileSystem).unwrap_err();
        assert!(matches!(err, VfsError::InvalidName { .. }));
    }

    #[rstest]
    #[case::plain("b", true)]
    #[case::nested("b/c", false)]
    #[case::parent("..", false)]
    #[case::current(".", false)]
    #[case::empty("", false)]
    fn test_resolve_child_scope(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(name("/a").resolve(input, NameScope::Child).is_ok(), ok);
    }

    #[rstest]
    #[case::inside("b/c", NameScope::Descendent, true)]
    #[case::self_strict(".", NameScope::Descendent, false)]
    #[case::sibling("../z", NameScope::Descendent, false)]
    #[case::self_allowed(".", NameScope::DescendentOrSelf, true)]
    #[case::absolute_inside("/a/q", NameScope::Descendent, true)]
    #[case::absolute_outside("/q", NameScope::DescendentOrSelf, false)]
    fn test_resolve_descendent_scopes(#[case] input: &str, #[case] scope: NameScope, #[case] ok: bool) {
        assert_eq!(name("/a").resolve(input, scope).is_ok(), ok);
    }

    #[test]
    fn test_extension() {
        assert_eq!(name("/a/b.tar.gz").extension(), Some("gz"));
        assert_eq!(name("/a/.hidden").extension(), None);
        assert_eq!(name("/a/plain").extension(), None);
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(FileName::hierarchical("1http", "", Vec::new()).is_err());
        assert!(FileName::hierarchical("", "", Vec::new()).is_err());
    }
}
