//! Header validation, run before any byte of the body is read.

use crate::protocol::RequestError;
use crate::utils::ensure;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Request};

/// Validates that a request carries a decodable body, handing it back on success.
pub(crate) fn check_request<B>(request: Option<Request<B>>) -> Result<Request<B>, RequestError> {
    let request = request.ok_or(RequestError::RequestNull)?;
    check_headers(Some(request.headers()))?;
    Ok(request)
}

/// Checks, in order, for a positive `content-length` and a non-empty `content-type`.
pub(crate) fn check_headers(headers: Option<&HeaderMap>) -> Result<(), RequestError> {
    let headers = headers.ok_or(RequestError::ContentLengthMissingOrZero)?;

    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    ensure!(content_length > 0, RequestError::ContentLengthMissingOrZero);

    let has_content_type = headers.get(CONTENT_TYPE).is_some_and(|value| !value.as_bytes().trim_ascii().is_empty());
    ensure!(has_content_type, RequestError::ContentTypeMissingOrEmpty);

    Ok(())
}
