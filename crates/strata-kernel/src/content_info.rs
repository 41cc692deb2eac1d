//! Content type and encoding derivation.

use strata_types::ContentInfo;

use crate::name::FileName;

/// Encoding reported when nothing better is known.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Derives [`ContentInfo`] from a backend-specific source.
pub trait ContentInfoFactory<S: ?Sized>: Send + Sync {
    fn create(&self, source: &S) -> ContentInfo;
}

/// Guesses the media type from the file name's extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentInfoFactory;

impl ContentInfoFactory<FileName> for DefaultContentInfoFactory {
    fn create(&self, name: &FileName) -> ContentInfo {
        let content_type = name.extension().and_then(media_type_for_extension);
        ContentInfo::new(content_type.map(str::to_string), DEFAULT_ENCODING)
    }
}

/// Media type for a well-known extension.
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    let media = match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "json" => "application/json",
        "toml" => "application/toml",
        "js" => "text/javascript",
        "rs" => "text/x-rust",
        "eml" | "mime" => "message/rfc822",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" | "jar" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        _ => return None,
    };
    Some(media)
}

/// The media type of a `Content-Type` value: everything before the first
/// `;` or `,`, trimmed.
pub fn media_type(value: &str) -> Option<&str> {
    let end = value.find([';', ',']).unwrap_or(value.len());
    let media = value[..end].trim();
    (!media.is_empty()).then_some(media)
}

/// Value of the `charset` parameter of a `Content-Type` value.
pub fn charset_param(value: &str) -> Option<&str> {
    value.split(';').skip(1).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| val.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}
