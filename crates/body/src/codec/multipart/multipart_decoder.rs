//! Decoder for `multipart/form-data` bodies.
//!
//! The body is a sequence of parts separated by a delimiter built from the boundary
//! ([RFC 2046 Section 5.1.1](https://tools.ietf.org/html/rfc2046#section-5.1.1)):
//!
//! ```text
//! preamble
//! --boundary\r\n
//! part headers\r\n
//! \r\n
//! part content
//! \r\n--boundary--\r\n
//! epilogue
//! ```
//!
//! A delimiter only counts when it is followed by `\r\n` or `--`, otherwise the bytes belong to
//! the part content. Part content is streamed out in chunks and never buffered whole.

use crate::codec::multipart::PartHeader;
use crate::protocol::MultipartError;
use crate::utils::ensure;
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use MultipartState::*;

/// Maximum size of the header block of one part.
pub const MAX_PART_HEADER_SIZE: usize = 8 * 1024;

/// Maximum boundary length allowed by RFC 2046.
pub const MAX_BOUNDARY_SIZE: usize = 70;

/// Items produced by [`MultipartDecoder`], in order: for every part a `Part`, zero or more
/// `Chunk`s and a `PartEnd`, then a single `Eof`.
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartItem {
    Part(PartHeader),
    Chunk(Bytes),
    PartEnd,
    Eof,
}

/// A streaming decoder splitting a multipart body into parts.
#[derive(Debug, Clone)]
pub struct MultipartDecoder {
    state: MultipartState,
    delimiters: Delimiters,
}

#[derive(Debug, Clone)]
struct Delimiters {
    /// `--boundary`, the first delimiter when the body has no preamble
    dash_boundary: Bytes,
    /// `\r\n--boundary`
    delimiter: Bytes,
}

impl MultipartDecoder {
    /// Creates a decoder for the given boundary, without the leading dashes.
    pub fn new(boundary: &str) -> Result<Self, MultipartError> {
        ensure!(!boundary.is_empty(), MultipartError::invalid_boundary("boundary is empty"));
        ensure!(
            boundary.len() <= MAX_BOUNDARY_SIZE,
            MultipartError::invalid_boundary(format!("boundary longer than {MAX_BOUNDARY_SIZE} bytes"))
        );

        let dash_boundary = Bytes::from(format!("--{boundary}"));
        let delimiter = Bytes::from(format!("\r\n--{boundary}"));
        Ok(Self { state: Start, delimiters: Delimiters { dash_boundary, delimiter } })
    }

    pub fn is_finished(&self) -> bool {
        self.state == End
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MultipartState {
    /// Nothing read yet, the body may open with `--boundary`
    Start,
    /// Skip the preamble up to the first `\r\n--boundary`
    Preamble,
    /// Read what follows a boundary: `\r\n` opens a part, `--` closes the body
    BoundaryTail,
    /// Read the part header block
    Headers,
    /// Read the part content
    Body,
    /// Final delimiter seen, the rest is epilogue
    End,
}

impl Decoder for MultipartDecoder {
    type Item = MultipartItem;
    type Error = MultipartError;

    /// Decodes the next multipart item from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(item))` when a part header, a content chunk or a part end is available
    /// - `Ok(Some(MultipartItem::Eof))` once the closing delimiter was read
    /// - `Ok(None)` when more data is needed
    /// - `Err(MultipartError)` if the envelope is malformed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                // epilogue
                src.clear();
                trace!("finished reading multipart body");
                return Ok(Some(MultipartItem::Eof));
            }

            let mut item = None;

            self.state = match self.state.step(src, &self.delimiters, &mut item) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(item) = item {
                return Ok(Some(item));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(MultipartError::UnexpectedEof),
        }
    }
}

impl MultipartState {
    fn step(
        &self,
        src: &mut BytesMut,
        delimiters: &Delimiters,
        item: &mut Option<MultipartItem>,
    ) -> Poll<Result<MultipartState, MultipartError>> {
        match self {
            Start => MultipartState::read_start(src, delimiters),
            Preamble => MultipartState::read_preamble(src, delimiters),
            BoundaryTail => MultipartState::read_boundary_tail(src),
            Headers => MultipartState::read_headers(src, item),
            Body => MultipartState::read_body(src, delimiters, item),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_start(src: &mut BytesMut, delimiters: &Delimiters) -> Poll<Result<MultipartState, MultipartError>> {
        let dash_boundary = &delimiters.dash_boundary;
        if src.starts_with(dash_boundary) {
            src.advance(dash_boundary.len());
            return Poll::Ready(Ok(BoundaryTail));
        }

        if dash_boundary.starts_with(&src[..]) {
            return Poll::Pending;
        }

        Poll::Ready(Ok(Preamble))
    }

    fn read_preamble(src: &mut BytesMut, delimiters: &Delimiters) -> Poll<Result<MultipartState, MultipartError>> {
        let delimiter = &delimiters.delimiter;
        match find(src, delimiter) {
            Some(index) => {
                trace!(len = index, "skipped multipart preamble");
                src.advance(index + delimiter.len());
                Poll::Ready(Ok(BoundaryTail))
            }
            None => {
                // keep what could be the start of a delimiter
                let discard = src.len().saturating_sub(delimiter.len() - 1);
                src.advance(discard);
                Poll::Pending
            }
        }
    }

    fn read_boundary_tail(src: &mut BytesMut) -> Poll<Result<MultipartState, MultipartError>> {
        if src.len() < 2 {
            return Poll::Pending;
        }

        match &src[..2] {
            b"--" => {
                src.advance(2);
                Poll::Ready(Ok(End))
            }
            b"\r\n" => {
                src.advance(2);
                Poll::Ready(Ok(Headers))
            }
            _ => Poll::Ready(Err(MultipartError::invalid_boundary("boundary not followed by CRLF or `--`"))),
        }
    }

    fn read_headers(src: &mut BytesMut, item: &mut Option<MultipartItem>) -> Poll<Result<MultipartState, MultipartError>> {
        // a part without any header line
        if src.starts_with(b"\r\n") {
            src.advance(2);
            return Poll::Ready(PartHeader::parse(&[]).map(|header| {
                *item = Some(MultipartItem::Part(header));
                Body
            }));
        }

        let Some(index) = find(src, b"\r\n\r\n") else {
            if src.len() > MAX_PART_HEADER_SIZE {
                return Poll::Ready(Err(MultipartError::too_large_header(src.len(), MAX_PART_HEADER_SIZE)));
            }
            return Poll::Pending;
        };

        if index > MAX_PART_HEADER_SIZE {
            return Poll::Ready(Err(MultipartError::too_large_header(index, MAX_PART_HEADER_SIZE)));
        }

        let block = src.split_to(index + 4);
        Poll::Ready(PartHeader::parse(&block[..index]).map(|header| {
            trace!(name = header.name(), file_name = header.file_name(), "read multipart part header");
            *item = Some(MultipartItem::Part(header));
            Body
        }))
    }

    fn read_body(
        src: &mut BytesMut,
        delimiters: &Delimiters,
        item: &mut Option<MultipartItem>,
    ) -> Poll<Result<MultipartState, MultipartError>> {
        let delimiter = &delimiters.delimiter;
        let keep = delimiter.len() - 1;

        let len = match find(src, delimiter) {
            Some(0) => {
                let tail = delimiter.len();
                if src.len() < tail + 2 {
                    return Poll::Pending;
                }

                if matches!(&src[tail..tail + 2], b"--" | b"\r\n") {
                    src.advance(tail);
                    *item = Some(MultipartItem::PartEnd);
                    return Poll::Ready(Ok(BoundaryTail));
                }

                // looks like a delimiter but is content
                match find(&src[1..], delimiter) {
                    Some(index) => index + 1,
                    None => src.len().saturating_sub(keep).max(1),
                }
            }
            Some(index) => index,
            None => src.len().saturating_sub(keep),
        };

        if len == 0 {
            return Poll::Pending;
        }

        let bytes = src.split_to(len).freeze();
        trace!(len = bytes.len(), "read multipart content");
        *item = Some(MultipartItem::Chunk(bytes));
        Poll::Ready(Ok(Body))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
