//! Core types of the body decoder.
//!
//! - **Registry** ([`content_type`]): the fixed table of supported MIME types
//!   - [`ContentTypeMeta`]: extension, decoding strategy and output shape of one type
//!   - [`lookup`]: resolves a `content-type` header value to its entry
//!
//! - **Options** ([`ParseConfig`], [`ParseOptions`]): caller configuration and its normalized form
//!
//! - **Results** ([`ParseResult`], [`FileData`]): what a parse call hands back
//!
//! - **Errors** ([`ParseError`], [`RequestError`], [`MultipartError`])

pub mod content_type;
pub use content_type::ContentTypeMeta;
pub use content_type::DecodeStrategy;
pub use content_type::OutputShape;
pub use content_type::lookup;

mod options;
pub use options::DEFAULT_MAX_MEMORY;
pub use options::ParseConfig;
pub use options::ParseOptions;

mod result;
pub use result::FileData;
pub use result::FileStorage;
pub use result::Files;
pub use result::ParseResult;
pub use result::UPLOADED_FILE_KEY;

mod error;
pub use error::MultipartError;
pub use error::ParseError;
pub use error::RequestError;
