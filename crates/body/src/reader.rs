//! Reading request bodies off the wire.
//!
//! [`read_raw`] drains a body into one buffer. [`read_form`] streams a multipart body through
//! [`MultipartDecoder`], keeping file content in memory until the form exceeds its memory
//! budget and spilling to temp files past that point. Plain field values always stay in memory,
//! they may take up to [`FIELD_MEMORY_RESERVE`] bytes on top of that budget.
//!
//! A failing body stream is never an error here: it is logged and reported as `None`, the
//! caller treats that as "no body".

use crate::codec::multipart::{MultipartDecoder, MultipartItem, PartHeader};
use crate::codec::value::coerce;
use crate::protocol::{MultipartError, ParseError, ParseOptions};
use crate::utils::ensure;
use bytes::{Bytes, BytesMut};
use http_body::Body;
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::pin::pin;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

const SPILL_PREFIX: &str = "micro-body-";

/// Memory reserved for plain field values beyond `max_memory`.
pub(crate) const FIELD_MEMORY_RESERVE: usize = 10 << 20;

/// Collects the whole body, `None` if the stream fails.
pub(crate) async fn read_raw<B>(body: B) -> Option<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    match body.collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) => {
            let e = e.into();
            warn!(error = %e, "failed to read request body, treating it as absent");
            None
        }
    }
}

/// Where the content of an uploaded file ended up while reading the form.
#[derive(Debug)]
pub(crate) enum PartStorage {
    Memory(Bytes),
    /// Removed from disk when dropped unless moved elsewhere first.
    Spilled(TempPath),
}

/// An uploaded file as read from the form, before any persistence.
#[derive(Debug)]
pub(crate) struct FilePart {
    pub(crate) file_name: String,
    pub(crate) content_type: String,
    pub(crate) size: u64,
    pub(crate) storage: PartStorage,
}

/// A fully read multipart form.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    pub(crate) fields: Map<String, Value>,
    pub(crate) files: BTreeMap<String, FilePart>,
}

/// Streams `body` as a multipart form delimited by `boundary`.
///
/// Returns `Ok(None)` when the stream fails or the body is empty, and an error when the
/// envelope is malformed or a spill file cannot be written. Spill files of a form that is not
/// returned are removed.
pub(crate) async fn read_form<B>(
    body: B,
    boundary: &str,
    options: &ParseOptions,
) -> Result<Option<MultipartForm>, ParseError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let mut decoder = MultipartDecoder::new(boundary)?;
    let mut buffer = BytesMut::new();
    let mut builder = FormBuilder::new(options);
    let mut received = 0;
    let mut body = pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                let e = e.into();
                warn!(error = %e, "failed to read multipart body, treating it as absent");
                return Ok(None);
            }
        };

        // trailers carry nothing to decode
        let Ok(data) = frame.into_data() else {
            continue;
        };

        received += data.len();
        if decoder.is_finished() {
            continue;
        }

        buffer.extend_from_slice(&data);
        while !decoder.is_finished() {
            let Some(item) = decoder.decode(&mut buffer)? else {
                break;
            };
            builder.push(item).await?;
        }
    }

    if received == 0 {
        debug!("multipart body is empty");
        return Ok(None);
    }

    while !decoder.is_finished() {
        match decoder.decode_eof(&mut buffer)? {
            Some(item) => builder.push(item).await?,
            None => return Err(MultipartError::UnexpectedEof.into()),
        }
    }

    Ok(Some(builder.finish()))
}

struct FormBuilder<'a> {
    options: &'a ParseOptions,
    form: MultipartForm,
    /// Bytes of file content currently held in memory across the whole form.
    in_memory: usize,
    /// Bytes of plain field values read so far.
    field_bytes: usize,
    current: Option<CurrentPart>,
}

struct CurrentPart {
    header: PartHeader,
    size: u64,
    sink: PartSink,
}

enum PartSink {
    Field(BytesMut),
    Memory(BytesMut),
    Spilled { file: File, path: TempPath },
}

impl<'a> FormBuilder<'a> {
    fn new(options: &'a ParseOptions) -> Self {
        Self { options, form: MultipartForm::default(), in_memory: 0, field_bytes: 0, current: None }
    }

    async fn push(&mut self, item: MultipartItem) -> Result<(), ParseError> {
        match item {
            MultipartItem::Part(header) => {
                let sink = if header.is_file() {
                    PartSink::Memory(BytesMut::new())
                } else {
                    PartSink::Field(BytesMut::new())
                };
                self.current = Some(CurrentPart { header, size: 0, sink });
            }
            MultipartItem::Chunk(bytes) => self.write(bytes).await?,
            MultipartItem::PartEnd => self.end_part().await?,
            MultipartItem::Eof => {
                trace!(fields = self.form.fields.len(), files = self.form.files.len(), "read multipart form");
            }
        }
        Ok(())
    }

    async fn write(&mut self, bytes: Bytes) -> Result<(), ParseError> {
        let Some(part) = self.current.as_mut() else {
            return Ok(());
        };
        part.size += bytes.len() as u64;

        match &mut part.sink {
            PartSink::Field(buf) => {
                let max_size = self.options.max_memory().saturating_add(FIELD_MEMORY_RESERVE);
                self.field_bytes += bytes.len();
                ensure!(
                    self.field_bytes <= max_size,
                    MultipartError::too_large_fields(self.field_bytes, max_size).into()
                );
                buf.extend_from_slice(&bytes);
            }
            PartSink::Memory(buf) if self.in_memory + bytes.len() <= self.options.max_memory() => {
                self.in_memory += bytes.len();
                buf.extend_from_slice(&bytes);
            }
            PartSink::Memory(buf) => {
                let named = tempfile::Builder::new().prefix(SPILL_PREFIX).tempfile_in(self.options.temp_dir())?;
                debug!(name = part.header.name(), path = %named.path().display(), "spilling multipart file to disk");

                let (file, path) = named.into_parts();
                let mut file = File::from_std(file);
                file.write_all(buf).await?;
                file.write_all(&bytes).await?;
                self.in_memory -= buf.len();
                part.sink = PartSink::Spilled { file, path };
            }
            PartSink::Spilled { file, .. } => file.write_all(&bytes).await?,
        }
        Ok(())
    }

    async fn end_part(&mut self) -> Result<(), ParseError> {
        let Some(CurrentPart { header, size, sink }) = self.current.take() else {
            return Ok(());
        };

        let storage = match sink {
            PartSink::Field(buf) => {
                let value = coerce(&String::from_utf8_lossy(&buf));
                self.form.fields.insert(header.name().to_owned(), value);
                return Ok(());
            }
            PartSink::Memory(buf) => PartStorage::Memory(buf.freeze()),
            PartSink::Spilled { mut file, path } => {
                file.flush().await?;
                PartStorage::Spilled(path)
            }
        };

        let file_part = FilePart {
            file_name: header.file_name().unwrap_or_default().to_owned(),
            content_type: header.file_content_type().to_owned(),
            size,
            storage,
        };

        // duplicate names are last-wins, release what the replaced file held
        if let Some(replaced) = self.form.files.insert(header.name().to_owned(), file_part)
            && let PartStorage::Memory(bytes) = replaced.storage
        {
            self.in_memory -= bytes.len();
        }
        Ok(())
    }

    fn finish(self) -> MultipartForm {
        self.form
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParseConfig;
    use futures::stream;
    use http_body::Frame;
    use http_body_util::{Full, StreamBody};
    use indoc::indoc;
    use serde_json::json;
    use std::io;

    const BOUNDARY: &str = "form-boundary";

    fn form_body() -> String {
        indoc! {r#"
            --form-boundary
            Content-Disposition: form-data; name="a"

            1
            --form-boundary
            Content-Disposition: form-data; name="b"

            two
            --form-boundary
            Content-Disposition: form-data; name="upload"; filename="notes.txt"
            Content-Type: text/plain

            0123456789
            --form-boundary--
        "#}
        .replace('\n', "\r\n")
    }

    /// Splits `body` into frames of `size` bytes.
    fn chunked(body: &str, size: usize) -> StreamBody<impl futures::Stream<Item = Result<Frame<Bytes>, io::Error>>> {
        let frames: Vec<_> = body.as_bytes().chunks(size).map(|c| Ok(Frame::data(Bytes::copy_from_slice(c)))).collect();
        StreamBody::new(stream::iter(frames))
    }

    #[tokio::test]
    async fn raw_body() {
        let raw = read_raw(Full::new(Bytes::from_static(b"hello"))).await;
        assert_eq!(raw.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn raw_body_stream_error() {
        let body = StreamBody::new(stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"he"))),
            Err(io::Error::other("connection reset")),
        ]));
        assert_eq!(read_raw(body).await, None);
    }

    #[tokio::test]
    async fn form_in_memory() {
        let options = ParseOptions::default();
        let form = read_form(chunked(&form_body(), 7), BOUNDARY, &options).await.unwrap().unwrap();

        assert_eq!(Value::Object(form.fields), json!({"a": 1, "b": "two"}));
        let upload = &form.files["upload"];
        assert_eq!(upload.file_name, "notes.txt");
        assert_eq!(upload.content_type, "text/plain");
        assert_eq!(upload.size, 10);
        assert!(matches!(&upload.storage, PartStorage::Memory(bytes) if bytes.as_ref() == b"0123456789"));
    }

    #[tokio::test]
    async fn form_spills_past_memory_budget() {
        let dir = tempfile::tempdir().unwrap();
        let options = ParseOptions::from(&ParseConfig::default().max_memory(4).temp_dir(dir.path()));

        let form = read_form(chunked(&form_body(), 3), BOUNDARY, &options).await.unwrap().unwrap();
        let upload = &form.files["upload"];
        assert_eq!(upload.size, 10);

        let PartStorage::Spilled(path) = &upload.storage else {
            panic!("expected a spilled file, got {:?}", upload.storage);
        };
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(path).unwrap(), b"0123456789");

        let spilled = path.to_path_buf();
        drop(form);
        assert!(!spilled.exists());
    }

    #[tokio::test]
    async fn form_stream_error_is_absent() {
        let body = StreamBody::new(stream::iter(vec![
            Ok(Frame::data(Bytes::from(form_body()[..40].to_owned()))),
            Err(io::Error::other("connection reset")),
        ]));
        let form = read_form(body, BOUNDARY, &ParseOptions::default()).await.unwrap();
        assert!(form.is_none());
    }

    #[tokio::test]
    async fn empty_form_is_absent() {
        let form = read_form(Full::new(Bytes::new()), BOUNDARY, &ParseOptions::default()).await.unwrap();
        assert!(form.is_none());
    }

    #[tokio::test]
    async fn truncated_form_fails() {
        let body = form_body();
        let truncated = &body[..body.len() - 20];
        let err = read_form(Full::new(Bytes::from(truncated.to_owned())), BOUNDARY, &ParseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Multipart { source: MultipartError::UnexpectedEof }));
    }

    #[tokio::test]
    async fn failed_form_removes_spill_files() {
        let dir = tempfile::tempdir().unwrap();
        let options = ParseOptions::from(&ParseConfig::default().max_memory(4).temp_dir(dir.path()));

        let content = "0123456789".repeat(8);
        let body = format!(
            "--form-boundary\r\n\
             Content-Disposition: form-data; name=\"upload\"; filename=\"big.txt\"\r\n\
             \r\n\
             {content}"
        );

        let err = read_form(chunked(&body, 16), BOUNDARY, &options).await.unwrap_err();
        assert!(matches!(err, ParseError::Multipart { source: MultipartError::UnexpectedEof }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn oversized_field_fails() {
        let options = ParseOptions::from(&ParseConfig::default().max_memory(16));

        let value = "x".repeat(16 + FIELD_MEMORY_RESERVE + 1);
        let body = format!(
            "--form-boundary\r\n\
             Content-Disposition: form-data; name=\"a\"\r\n\
             \r\n\
             {value}\r\n\
             --form-boundary--\r\n"
        );

        let err = read_form(chunked(&body, 1 << 20), BOUNDARY, &options).await.unwrap_err();
        assert!(matches!(
            err,
            ParseError::Multipart { source: MultipartError::TooLargeFields { max_size, .. } }
                if max_size == 16 + FIELD_MEMORY_RESERVE
        ));
    }

    #[tokio::test]
    async fn fields_within_reserve_are_kept() {
        let options = ParseOptions::from(&ParseConfig::default().max_memory(16));

        let value = "x".repeat(1024);
        let body = format!(
            "--form-boundary\r\n\
             Content-Disposition: form-data; name=\"a\"\r\n\
             \r\n\
             {value}\r\n\
             --form-boundary--\r\n"
        );

        let form = read_form(chunked(&body, 100), BOUNDARY, &options).await.unwrap().unwrap();
        assert_eq!(form.fields["a"], json!(value));
    }

    #[tokio::test]
    async fn duplicate_fields_last_wins() {
        let body = indoc! {r#"
            --form-boundary
            Content-Disposition: form-data; name="a"

            1
            --form-boundary
            Content-Disposition: form-data; name="a"

            true
            --form-boundary--
        "#}
        .replace('\n', "\r\n");
        let form = read_form(Full::new(Bytes::from(body)), BOUNDARY, &ParseOptions::default()).await.unwrap().unwrap();
        assert_eq!(Value::Object(form.fields), json!({"a": true}));
    }
}
