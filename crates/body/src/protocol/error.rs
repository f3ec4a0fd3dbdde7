use std::io;
use thiserror::Error;

/// Top-level error returned by [`parse`](crate::parse).
///
/// Stream failures and missing multipart boundaries are not errors, they surface as `Ok(None)`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid request: {source}")]
    Request {
        #[from]
        source: RequestError,
    },

    #[error("invalid json body: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid url-encoded body: {source}")]
    Form {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("invalid multipart body: {source}")]
    Multipart {
        #[from]
        source: MultipartError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if the request was rejected before its body was read.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}

/// Verdict of the header validator when a request cannot be decoded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("request object is null")]
    RequestNull,

    #[error("content length is 0 or missing")]
    ContentLengthMissingOrZero,

    #[error("content type is missing or empty")]
    ContentTypeMissingOrEmpty,
}

/// Errors raised while splitting a `multipart/form-data` envelope.
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("invalid boundary: {reason}")]
    InvalidBoundary { reason: String },

    #[error("part header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("invalid part header: {reason}")]
    InvalidHeader { reason: String },

    #[error("missing content-disposition header in part")]
    MissingContentDisposition,

    #[error("missing name parameter in content-disposition")]
    MissingName,

    #[error("unexpected end of multipart body")]
    UnexpectedEof,

    #[error("form fields too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeFields { current_size: usize, max_size: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl MultipartError {
    pub fn invalid_boundary<S: ToString>(str: S) -> Self {
        Self::InvalidBoundary { reason: str.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn too_large_fields(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeFields { current_size, max_size }
    }
}
