//! Name parsing and scoped resolution.

use std::sync::Arc;

use strata_types::{FileType, NameScope};

use crate::error::{VfsError, VfsResult};
use crate::name::{decode_segment, is_valid_scheme, normalize_parts, FileName, LAYER_SEPARATOR};
use crate::registry::{ProviderRegistry, SchemeKind};

/// Parses text into [`FileName`]s and resolves relative names.
///
/// The registry decides which schemes are layered; an unregistered scheme
/// is a malformed name.
#[derive(Debug, Clone)]
pub struct NameResolver {
    registry: Arc<ProviderRegistry>,
}

impl NameResolver {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Parse an absolute URI.
    ///
    /// Layered names are split at the last `!`: everything before it is
    /// parsed recursively as the inner name. Path segments are
    /// percent-decoded.
    pub fn parse(&self, text: &str) -> VfsResult<FileName> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VfsError::invalid_name(text, "empty name"));
        }
        if text.contains('\0') {
            return Err(VfsError::invalid_name(text, "name contains a NUL byte"));
        }

        let (scheme, rest) =
            split_scheme(text).ok_or_else(|| VfsError::invalid_name(text, "missing scheme"))?;
        let kind = self
            .registry
            .kind(scheme)
            .ok_or_else(|| VfsError::invalid_name(text, format!("unknown scheme {scheme:?}")))?;

        let (name, path) = match kind {
            SchemeKind::Layered => {
                let idx = rest.rfind(LAYER_SEPARATOR).ok_or_else(|| {
                    VfsError::invalid_name(text, "layered name needs '!' after the inner name")
                })?;
                let inner = self.parse(&rest[..idx])?;
                let path = &rest[idx + LAYER_SEPARATOR.len_utf8()..];
                let segments = parse_path(text, path)?;
                (FileName::layered(scheme, inner, segments)?, path)
            }
            SchemeKind::Hierarchical => {
                let (authority, path) = match rest.strip_prefix("//") {
                    Some(after) => match after.find('/') {
                        Some(idx) => (&after[..idx], &after[idx..]),
                        None => (after, ""),
                    },
                    None => ("", rest),
                };
                let segments = parse_path(text, path)?;
                (FileName::hierarchical(scheme, authority, segments)?, path)
            }
        };

        let hint = if path.ends_with('/') && !name.is_root() {
            Some(FileType::Folder)
        } else {
            None
        };
        Ok(name.with_type_hint(hint))
    }

    /// Resolve `path` against `base` under `scope`.
    ///
    /// With [`NameScope::FileSystem`], a path carrying its own scheme is
    /// parsed as an absolute URI.
    pub fn resolve(&self, base: &FileName, path: &str, scope: NameScope) -> VfsResult<FileName> {
        if scope == NameScope::FileSystem && split_scheme(path).is_some() {
            return self.parse(path);
        }
        base.resolve(path, scope)
    }
}

/// Split `scheme:rest`. Single-letter prefixes are not schemes (`C:\`).
fn split_scheme(text: &str) -> Option<(&str, &str)> {
    let idx = text.find(':')?;
    let scheme = &text[..idx];
    if scheme.len() < 2 || !is_valid_scheme(scheme) {
        return None;
    }
    Some((scheme, &text[idx + 1..]))
}

fn parse_path(text: &str, path: &str) -> VfsResult<Vec<String>> {
    if !path.is_empty() && !path.starts_with('/') {
        return Err(VfsError::invalid_name(text, "expected an absolute path"));
    }
    let parts = path
        .split('/')
        .map(decode_segment)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| VfsError::invalid_name(text, reason))?;
    normalize_parts(&[], parts.iter().map(String::as_str)).map_err(|reason| VfsError::invalid_name(text, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FileSystem;
    use crate::registry::{FileProvider, ProviderContext};
    use async_trait::async_trait;
    use rstest::rstest;

    struct Stub(SchemeKind);

    #[async_trait]
    impl FileProvider for Stub {
        fn kind(&self) -> SchemeKind {
            self.0
        }

        async fn create_file_system(
            &self,
            root: FileName,
            _cx: ProviderContext<'_>,
        ) -> VfsResult<Arc<FileSystem>> {
            Err(VfsError::not_found(root.to_string()))
        }
    }

    fn resolver() -> NameResolver {
        let registry = ProviderRegistry::new()
            .with("file", Stub(SchemeKind::Hierarchical))
            .with("http", Stub(SchemeKind::Hierarchical))
            .with("zip", Stub(SchemeKind::Layered))
            .with("mime", Stub(SchemeKind::Layered));
        NameResolver::new(Arc::new(registry))
    }

    #[rstest]
    #[case::file("file:///tmp/a.txt", "file", "/tmp/a.txt")]
    #[case::file_short("file:/tmp/a.txt", "file", "/tmp/a.txt")]
    #[case::http("http://example.com/x/y", "http", "/x/y")]
    #[case::http_root("http://example.com", "http", "/")]
    #[case::upper_scheme("FILE:///a", "file", "/a")]
    #[case::dots("file:///a/./b/../c", "file", "/a/c")]
    fn test_parse_hierarchical(#[case] text: &str, #[case] scheme: &str, #[case] path: &str) {
        let name = resolver().parse(text).unwrap();
        assert_eq!(name.scheme(), scheme);
        assert_eq!(name.path(), path);
    }

    #[test]
    fn test_parse_authority() {
        let name = resolver().parse("http://example.com:8080/a").unwrap();
        assert_eq!(name.authority(), Some("example.com:8080"));
        assert_eq!(name.to_string(), "http://example.com:8080/a");
    }

    #[test]
    fn test_parse_layered() {
        let name = resolver().parse("zip:file:///tmp/a.zip!/dir/f.txt").unwrap();
        assert_eq!(name.scheme(), "zip");
        assert_eq!(name.path(), "/dir/f.txt");
        let inner = name.inner().unwrap();
        assert_eq!(inner.to_string(), "file:///tmp/a.zip");
        assert_eq!(name.root().to_string(), "zip:file:///tmp/a.zip!/");
    }

    #[test]
    fn test_parse_doubly_layered_splits_at_last_separator() {
        let name = resolver()
            .parse("mime:zip:file:///a.zip!/mail.eml!/part-0")
            .unwrap();
        assert_eq!(name.path(), "/part-0");
        let inner = name.inner().unwrap();
        assert_eq!(inner.scheme(), "zip");
        assert_eq!(inner.path(), "/mail.eml");
        assert_eq!(inner.inner().unwrap().path(), "/a.zip");
    }

    #[rstest]
    #[case::empty("")]
    #[case::no_scheme("/tmp/a")]
    #[case::unknown("ftp://host/a")]
    #[case::layered_without_separator("zip:file:///a.zip")]
    #[case::relative_path("file:tmp/a")]
    #[case::escape("file:///../etc")]
    #[case::nul("file:///a\0b")]
    fn test_parse_rejects(#[case] text: &str) {
        let err = resolver().parse(text).unwrap_err();
        assert!(matches!(err, VfsError::InvalidName { .. }), "{text}: {err:?}");
    }

    #[test]
    fn test_trailing_slash_hints_folder() {
        let name = resolver().parse("file:///a/b/").unwrap();
        assert_eq!(name.type_hint(), Some(FileType::Folder));
        assert_eq!(resolver().parse("file:///a/b").unwrap().type_hint(), None);
    }

    #[test]
    fn test_resolve_absolute_uri_in_file_system_scope() {
        let r = resolver();
        let base = r.parse("file:///a").unwrap();
        let other = r.resolve(&base, "http://h/x", NameScope::FileSystem).unwrap();
        assert_eq!(other.scheme(), "http");
        assert!(r.resolve(&base, "http://h/x", NameScope::Child).is_err());
    }

    #[test]
    fn test_escaped_bang_stays_in_segment() {
        let name = resolver().parse("mime:file:///tmp/m%21.eml!/Hi%21.txt").unwrap();
        assert_eq!(name.segments(), ["Hi!.txt"]);
        assert_eq!(name.inner().unwrap().segments(), ["tmp", "m!.eml"]);
        assert_eq!(name.to_string(), "mime:file:///tmp/m%21.eml!/Hi%21.txt");
    }

    #[test]
    fn test_escaped_separator_is_rejected() {
        assert!(resolver().parse("file:///a%2Fb").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let r = resolver();
        for text in ["file:///a/b", "http://h:1/x", "zip:file:///a.zip!/b/c", "file:///a%20b/100%25"] {
            let name = r.parse(text).unwrap();
            assert_eq!(r.parse(&name.to_string()).unwrap(), name);
        }
    }
}
