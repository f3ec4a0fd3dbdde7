//! Strategy dispatch and the public entry point.
//!
//! A parse call runs sequentially: validate headers, resolve the content type, read and decode
//! the body with the strategy the registry names, then assemble the result, persisting files
//! when configured to.

use crate::check::check_request;
use crate::codec::multipart;
use crate::codec::urlencoded::decode_form;
use crate::codec::xml::xml_to_json;
use crate::persist::{Assembler, FileStore, LocalFileStore, file_name_hint};
use crate::protocol::content_type::essence;
use crate::protocol::{ContentTypeMeta, DecodeStrategy, ParseConfig, ParseError, ParseOptions, ParseResult, lookup};
use crate::reader::{MultipartForm, read_form, read_raw};
use bytes::Bytes;
use http::Request;
use http::header::CONTENT_TYPE;
use http_body::Body;
use serde_json::Value;
use std::error::Error;
use tracing::debug;

/// A body decoded by its strategy, before assembly.
#[derive(Debug)]
pub(crate) enum DecodedBody {
    /// A body read as a whole, `raw` kept for persistence.
    Value { value: DecodedValue, raw: Bytes },
    Form(MultipartForm),
}

#[derive(Debug)]
pub(crate) enum DecodedValue {
    Text(String),
    Binary(Bytes),
    Data(Value),
}

/// Decodes request bodies according to their content type.
///
/// The parser holds no per-request state; one instance can serve concurrent calls.
///
/// # Example
/// ```no_run
/// # use micro_body::{BodyParser, ParseConfig};
/// # use http_body_util::Full;
/// # use bytes::Bytes;
/// # async fn run() -> Result<(), micro_body::ParseError> {
/// let request = http::Request::builder()
///     .header("content-type", "application/x-www-form-urlencoded")
///     .header("content-length", "7")
///     .body(Full::new(Bytes::from_static(b"a=5&b=x")))
///     .unwrap();
///
/// let result = BodyParser::new().parse(Some(request), &ParseConfig::default()).await?;
/// assert_eq!(result.and_then(|r| r.data()), Some(serde_json::json!({"a": 5, "b": "x"})));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BodyParser<S = LocalFileStore> {
    store: S,
}

impl BodyParser {
    /// A parser persisting to the local filesystem.
    pub fn new() -> Self {
        Self { store: LocalFileStore }
    }
}

impl<S: FileStore> BodyParser<S> {
    /// A parser persisting through `store`.
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    /// Decodes the body of `request`.
    ///
    /// # Returns
    /// - `Ok(Some(result))` with the decoded body
    /// - `Ok(None)` when there is nothing to decode: the body stream failed, the body is empty
    ///   or a multipart content type has no boundary
    /// - `Err(ParseError::Request { .. })` when the request fails header validation, the body
    ///   is not read in that case
    /// - `Err(..)` for malformed JSON, url-encoded or multipart content and for persistence
    ///   failures
    pub async fn parse<B>(
        &self,
        request: Option<Request<B>>,
        config: &ParseConfig,
    ) -> Result<Option<ParseResult>, ParseError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let request = check_request(request)?;
        let options = ParseOptions::from(config);

        let (parts, body) = request.into_parts();
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();

        let meta = lookup(&content_type);
        debug!(content_type = %content_type, strategy = ?meta.strategy(), "decoding request body");

        let Some(decoded) = decode(meta, &content_type, body, &options).await? else {
            return Ok(None);
        };

        let assembler = Assembler::new(&self.store, &options, file_name_hint(&parts.uri));
        assembler.assemble(meta, essence(&content_type), decoded).await.map(Some)
    }
}

/// Decodes `request` with a [`BodyParser`] persisting to the local filesystem.
///
/// See [`BodyParser::parse`] for the possible outcomes.
pub async fn parse<B>(request: Option<Request<B>>, config: &ParseConfig) -> Result<Option<ParseResult>, ParseError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    BodyParser::new().parse(request, config).await
}

async fn decode<B>(
    meta: &ContentTypeMeta,
    content_type: &str,
    body: B,
    options: &ParseOptions,
) -> Result<Option<DecodedBody>, ParseError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    if meta.strategy() == DecodeStrategy::Multipart {
        let Some(boundary) = multipart::boundary(content_type) else {
            debug!(content_type, "multipart content type without boundary");
            return Ok(None);
        };
        return Ok(read_form(body, &boundary, options).await?.map(DecodedBody::Form));
    }

    let Some(raw) = read_raw(body).await.filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    let value = decode_value(meta.strategy(), &raw, options)?;
    Ok(Some(DecodedBody::Value { value, raw }))
}

/// Decodes a fully read body.
fn decode_value(strategy: DecodeStrategy, raw: &Bytes, options: &ParseOptions) -> Result<DecodedValue, ParseError> {
    let value = match strategy {
        DecodeStrategy::Text => DecodedValue::Text(text(raw)),
        DecodeStrategy::Unknown if options.unknown_as_text() => DecodedValue::Text(text(raw)),
        DecodeStrategy::Json => DecodedValue::Data(serde_json::from_slice(raw)?),
        DecodeStrategy::UrlEncoded => DecodedValue::Data(Value::Object(decode_form(raw)?)),
        DecodeStrategy::Xml if options.xml_to_json() => DecodedValue::Data(Value::Object(xml_to_json(&text(raw)))),
        DecodeStrategy::Xml => DecodedValue::Text(text(raw)),
        // multipart bodies are streamed by `decode` and never buffered here
        DecodeStrategy::Binary | DecodeStrategy::Unknown | DecodeStrategy::Multipart => {
            DecodedValue::Binary(raw.clone())
        }
    };
    Ok(value)
}

fn text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
