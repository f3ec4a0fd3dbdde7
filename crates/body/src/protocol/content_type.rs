//! Content-type registry.
//!
//! A fixed table mapping canonical MIME strings to the metadata the parser needs:
//! the file extension used when persisting, the decoding strategy and the shape of
//! the result handed back to the caller.
//!
//! Matching is a linear scan over [`SUPPORTED_CONTENT_TYPES`] comparing the content-type
//! value, stripped of its parameters, byte for byte. Anything unmatched falls back to
//! [`UNKNOWN`].

use crate::protocol::ParseOptions;

/// How a request body is turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStrategy {
    /// Body bytes are passed through untouched.
    Binary,
    /// Body is decoded as UTF-8 text.
    Text,
    /// Body is parsed as JSON.
    Json,
    /// Body is parsed as `application/x-www-form-urlencoded` pairs.
    UrlEncoded,
    /// Body is decoded as text and optionally flattened into a structure.
    Xml,
    /// Body is split into `multipart/form-data` fields and files.
    Multipart,
    /// Content type is not in the registry, resolves to `Text` or `Binary` per options.
    Unknown,
}

/// The top-level key of a [`ParseResult`](crate::protocol::ParseResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputShape {
    Text,
    Binary,
    Data,
    Files,
}

impl OutputShape {
    /// The key used when a result is serialized.
    pub fn key(self) -> &'static str {
        match self {
            OutputShape::Text => "txt",
            OutputShape::Binary => "raw",
            OutputShape::Data => "data",
            OutputShape::Files => "files",
        }
    }
}

/// Immutable metadata for one supported MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentTypeMeta {
    mime: &'static str,
    extension: &'static str,
    shape: OutputShape,
    strategy: DecodeStrategy,
}

impl ContentTypeMeta {
    const fn new(mime: &'static str, extension: &'static str, shape: OutputShape, strategy: DecodeStrategy) -> Self {
        Self { mime, extension, shape, strategy }
    }

    const fn binary(mime: &'static str, extension: &'static str) -> Self {
        Self::new(mime, extension, OutputShape::Binary, DecodeStrategy::Binary)
    }

    const fn text(mime: &'static str, extension: &'static str) -> Self {
        Self::new(mime, extension, OutputShape::Text, DecodeStrategy::Text)
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// The shape declared in the registry, before options are applied.
    pub fn shape(&self) -> OutputShape {
        self.shape
    }

    pub fn strategy(&self) -> DecodeStrategy {
        self.strategy
    }

    pub fn is_unknown(&self) -> bool {
        self.strategy == DecodeStrategy::Unknown
    }

    /// The shape a result will actually have once options are taken into account.
    ///
    /// Unknown content treated as text and XML left unconverted both come back as text.
    pub fn effective_shape(&self, options: &ParseOptions) -> OutputShape {
        match self.strategy {
            DecodeStrategy::Unknown if options.unknown_as_text() => OutputShape::Text,
            DecodeStrategy::Unknown => OutputShape::Binary,
            DecodeStrategy::Xml if !options.xml_to_json() => OutputShape::Text,
            _ => self.shape,
        }
    }
}

pub const AUDIO_AAC: ContentTypeMeta = ContentTypeMeta::binary("audio/aac", "aac");
pub const OCTET_STREAM: ContentTypeMeta = ContentTypeMeta::binary("application/octet-stream", "bin");
pub const BZIP: ContentTypeMeta = ContentTypeMeta::binary("application/x-bzip", "bz");
pub const BZIP_2: ContentTypeMeta = ContentTypeMeta::binary("application/x-bzip2", "bz2");
pub const CSV: ContentTypeMeta = ContentTypeMeta::text("text/csv", "csv");
pub const MS_WORD: ContentTypeMeta = ContentTypeMeta::binary("application/msword", "doc");
pub const MS_WORD_X: ContentTypeMeta =
    ContentTypeMeta::binary("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx");
pub const EPUB: ContentTypeMeta = ContentTypeMeta::binary("application/epub+zip", "epub");
pub const GZ: ContentTypeMeta = ContentTypeMeta::binary("application/gzip", "gz");
pub const GIF: ContentTypeMeta = ContentTypeMeta::binary("image/gif", "gif");
pub const HTML: ContentTypeMeta = ContentTypeMeta::text("text/html", "html");
pub const JPG: ContentTypeMeta = ContentTypeMeta::binary("image/jpeg", "jpg");
pub const JSON: ContentTypeMeta =
    ContentTypeMeta::new("application/json", "json", OutputShape::Data, DecodeStrategy::Json);
pub const MP3: ContentTypeMeta = ContentTypeMeta::binary("audio/mpeg", "mp3");
pub const MP4: ContentTypeMeta = ContentTypeMeta::binary("video/mp4", "mp4");
pub const MPEG: ContentTypeMeta = ContentTypeMeta::binary("video/mpeg", "mpeg");
pub const PNG: ContentTypeMeta = ContentTypeMeta::binary("image/png", "png");
pub const PDF: ContentTypeMeta = ContentTypeMeta::binary("application/pdf", "pdf");
pub const PPT: ContentTypeMeta = ContentTypeMeta::binary("application/vnd.ms-powerpoint", "ppt");
pub const PPT_X: ContentTypeMeta =
    ContentTypeMeta::binary("application/vnd.openxmlformats-officedocument.presentationml.presentation", "pptx");
pub const RAR: ContentTypeMeta = ContentTypeMeta::binary("application/vnd.rar", "rar");
pub const RTF: ContentTypeMeta = ContentTypeMeta::binary("application/rtf", "rtf");
pub const SVG: ContentTypeMeta = ContentTypeMeta::binary("image/svg+xml", "svg");
pub const TAR: ContentTypeMeta = ContentTypeMeta::binary("application/x-tar", "tar");
pub const TEXT: ContentTypeMeta = ContentTypeMeta::text("text/plain", "txt");
pub const WAV: ContentTypeMeta = ContentTypeMeta::binary("audio/wav", "wav");
pub const XLS: ContentTypeMeta = ContentTypeMeta::binary("application/vnd.ms-excel", "xls");
pub const XLS_X: ContentTypeMeta =
    ContentTypeMeta::binary("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx");
pub const ZIP: ContentTypeMeta = ContentTypeMeta::binary("application/zip", "zip");
pub const URL_ENCODED: ContentTypeMeta =
    ContentTypeMeta::new("application/x-www-form-urlencoded", "data", OutputShape::Data, DecodeStrategy::UrlEncoded);
pub const XML: ContentTypeMeta = ContentTypeMeta::new("text/xml", "xml", OutputShape::Data, DecodeStrategy::Xml);
pub const MULTIPART_FORM_DATA: ContentTypeMeta =
    ContentTypeMeta::new("multipart/form-data", "data", OutputShape::Data, DecodeStrategy::Multipart);

/// Sentinel for content types not in the registry.
pub const UNKNOWN: ContentTypeMeta = ContentTypeMeta::new("UNKNOWN", "bin", OutputShape::Binary, DecodeStrategy::Unknown);

/// Every concrete entry of the registry; canonical MIME strings are unique.
pub static SUPPORTED_CONTENT_TYPES: [ContentTypeMeta; 32] = [
    AUDIO_AAC,
    OCTET_STREAM,
    BZIP,
    BZIP_2,
    CSV,
    MS_WORD,
    MS_WORD_X,
    EPUB,
    GZ,
    GIF,
    HTML,
    JPG,
    JSON,
    MP3,
    MP4,
    MPEG,
    PNG,
    PDF,
    PPT,
    PPT_X,
    RAR,
    RTF,
    SVG,
    TAR,
    TEXT,
    WAV,
    XLS,
    XLS_X,
    ZIP,
    URL_ENCODED,
    XML,
    MULTIPART_FORM_DATA,
];

/// Strips the parameters from a content-type value, e.g. `text/plain; charset=utf-8` -> `text/plain`.
///
/// Nothing else is normalized, surrounding whitespace is kept.
pub fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default()
}

/// Finds the registry entry for a raw `content-type` header value.
///
/// The match is case-sensitive; unmatched values resolve to [`UNKNOWN`].
pub fn lookup(content_type: &str) -> &'static ContentTypeMeta {
    let essence = essence(content_type);
    SUPPORTED_CONTENT_TYPES.iter().find(|meta| meta.mime == essence).unwrap_or(&UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParseConfig;
    use std::collections::HashSet;

    #[test]
    fn canonical_strings_are_unique() {
        let mimes: HashSet<_> = SUPPORTED_CONTENT_TYPES.iter().map(ContentTypeMeta::mime).collect();
        assert_eq!(mimes.len(), SUPPORTED_CONTENT_TYPES.len());
    }

    #[test]
    fn lookup_exact() {
        assert_eq!(lookup("audio/aac"), &AUDIO_AAC);
        assert_eq!(lookup("application/json"), &JSON);
        assert_eq!(lookup("text/xml").strategy(), DecodeStrategy::Xml);
        assert_eq!(lookup("application/x-www-form-urlencoded").strategy(), DecodeStrategy::UrlEncoded);
    }

    #[test]
    fn lookup_strips_parameters() {
        assert_eq!(lookup("text/plain; charset=utf-8"), &TEXT);
        assert_eq!(lookup("multipart/form-data; boundary=----abc"), &MULTIPART_FORM_DATA);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(lookup("Application/JSON").is_unknown());
        assert!(lookup("x-unknown-type").is_unknown());
        assert!(lookup("").is_unknown());
    }

    #[test]
    fn lookup_is_byte_exact() {
        assert_eq!(essence(" text/plain ; charset=utf-8"), " text/plain ");
        assert!(lookup(" text/plain").is_unknown());
        assert!(lookup("text/plain ;charset=utf-8").is_unknown());
    }

    #[test]
    fn unknown_sentinel() {
        assert_eq!(UNKNOWN.extension(), "bin");
        assert_eq!(UNKNOWN.shape(), OutputShape::Binary);
    }

    #[test]
    fn effective_shape_overrides() {
        let defaults = ParseOptions::from(&ParseConfig::default());
        let as_text = ParseOptions::from(&ParseConfig::default().unknown_as_text(true).xml_to_json(false));

        assert_eq!(UNKNOWN.effective_shape(&defaults), OutputShape::Binary);
        assert_eq!(UNKNOWN.effective_shape(&as_text), OutputShape::Text);
        assert_eq!(XML.effective_shape(&defaults), OutputShape::Data);
        assert_eq!(XML.effective_shape(&as_text), OutputShape::Text);
        assert_eq!(PNG.effective_shape(&as_text), OutputShape::Binary);
        assert_eq!(CSV.effective_shape(&defaults), OutputShape::Text);
    }
}
