//! An asynchronous HTTP request body decoder
//!
//! This crate turns the body of an `http::Request` into a typed value based on its
//! `content-type`: plain text, raw bytes, JSON, url-encoded forms, XML and `multipart/form-data`
//! uploads. Decoded bodies can optionally be persisted to disk instead of returned in memory.
//!
//! # Features
//!
//! - A fixed registry of supported MIME types, each tied to a decoding strategy
//! - Streaming multipart decoding built on `tokio_util::codec`
//! - Uploaded files kept in memory up to a budget, spilled to temp files past it
//! - Typed coercion of form values into numbers and booleans
//! - Optional persistence with collision-resistant file names and canonical paths
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use micro_body::{ParseConfig, ParseResult, parse};
//!
//! # async fn run() -> Result<(), micro_body::ParseError> {
//! let request = http::Request::builder()
//!     .uri("/upload?filename=order.json")
//!     .header("content-type", "application/json")
//!     .header("content-length", "12")
//!     .body(Full::new(Bytes::from_static(br#"{"id": 1024}"#)))
//!     .unwrap();
//!
//! match parse(Some(request), &ParseConfig::default()).await? {
//!     Some(ParseResult::Data(value)) => println!("decoded {value}"),
//!     Some(other) => println!("decoded into {:?}", other.shape()),
//!     None => println!("nothing to decode"),
//! }
//!
//! // persisting the body writes `./order.json` and reports its absolute path
//! let config = ParseConfig::default().save_body_to_file(true);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: content-type registry, options, results and errors
//! - [`codec`]: the decoders proper, free of any I/O
//! - [`BodyParser`]: validation, dispatch and assembly of results
//!
//! # Outcomes
//!
//! A parse call yields exactly one of:
//!
//! - a complete [`ParseResult`]
//! - `None` when there is nothing to decode: failed or empty body stream, multipart content
//!   type without a boundary
//! - a [`ParseError`]: failed header validation, malformed JSON, url-encoded or multipart
//!   content, persistence I/O failures
//!
//! # Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.

pub mod codec;
pub mod protocol;

mod check;
mod parser;
mod persist;
mod reader;
mod utils;

pub use parser::BodyParser;
pub use parser::parse;
pub use persist::FileStore;
pub use persist::LocalFileStore;
pub use protocol::FileData;
pub use protocol::FileStorage;
pub use protocol::Files;
pub use protocol::OutputShape;
pub use protocol::ParseConfig;
pub use protocol::ParseError;
pub use protocol::ParseResult;
