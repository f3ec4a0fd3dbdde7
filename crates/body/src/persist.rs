//! Turns a decoded body into a [`ParseResult`], writing files when asked to.
//!
//! Every file written gets a fresh name made of a random alphanumeric token and an extension,
//! unless the request URL carries a `filename` or `fileName` query parameter for a body
//! persisted as a whole. Reported paths are canonical.
//!
//! A call either returns all of its files or none: when a write fails, the files the call already
//! placed in the save directory are removed again.

use crate::parser::{DecodedBody, DecodedValue};
use crate::protocol::{
    ContentTypeMeta, FileData, FileStorage, Files, ParseError, ParseOptions, ParseResult, UPLOADED_FILE_KEY,
};
use crate::reader::{FilePart, MultipartForm, PartStorage};
use async_trait::async_trait;
use http::Uri;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde_json::Value;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

const TOKEN_LEN: usize = 16;

/// Extension of uploaded files whose name carries none.
const UNKNOWN_EXTENSION: &str = "unknown";

/// Content type and extension of the file holding persisted multipart fields.
const FIELDS_CONTENT_TYPE: &str = "application/json";
const FIELDS_EXTENSION: &str = "json";

/// The filesystem operations persistence relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Creates or truncates the file at `path` and writes `contents` to it.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Moves a temp file to `to`; the temp file no longer exists afterwards.
    async fn rename(&self, from: TempPath, to: &Path) -> io::Result<()>;

    async fn remove(&self, path: &Path) -> io::Result<()>;

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// [`FileStore`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

#[async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn rename(&self, from: TempPath, to: &Path) -> io::Result<()> {
        match tokio::fs::rename(&from, to).await {
            Ok(()) => {
                from.keep().map_err(|e| e.error)?;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying instead");
                tokio::fs::copy(&from, to).await?;
                from.close()
            }
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }
}

/// A random alphanumeric token, unique with overwhelming probability.
pub(crate) fn random_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect()
}

#[derive(Debug, Default, Deserialize)]
struct FileNameQuery {
    filename: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

/// The file name requested through the `filename` or `fileName` query parameter, reduced to its
/// final path component.
pub(crate) fn file_name_hint(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    let query: FileNameQuery = serde_qs::from_str(query).ok()?;
    let hint = query.filename.or(query.file_name)?;

    let name = Path::new(&hint).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_owned())
}

/// Name for a body persisted as a whole: the hint, completed with `extension` if it has none,
/// or a random token.
fn body_file_name(hint: Option<&str>, extension: &str) -> String {
    match hint {
        Some(hint) if Path::new(hint).extension().is_some() => hint.to_owned(),
        Some(hint) => format!("{hint}.{extension}"),
        None => format!("{}.{extension}", random_token()),
    }
}

/// The extension of an uploaded file name, `unknown` when it has none.
fn upload_extension(file_name: &str) -> &str {
    Path::new(file_name)
        .extension()
        .and_then(OsStr::to_str)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(UNKNOWN_EXTENSION)
}

/// Builds results out of decoded bodies for one parse call.
pub(crate) struct Assembler<'a, S: ?Sized> {
    store: &'a S,
    options: &'a ParseOptions,
    hint: Option<String>,
}

impl<'a, S: FileStore + ?Sized> Assembler<'a, S> {
    pub(crate) fn new(store: &'a S, options: &'a ParseOptions, hint: Option<String>) -> Self {
        Self { store, options, hint }
    }

    /// Produces the result for `decoded`, `content_type` being the request's MIME type without
    /// parameters.
    pub(crate) async fn assemble(
        &self,
        meta: &ContentTypeMeta,
        content_type: &str,
        decoded: DecodedBody,
    ) -> Result<ParseResult, ParseError> {
        let mut written = Vec::new();
        let result = self.assemble_into(meta, content_type, decoded, &mut written).await;
        if let Err(e) = &result {
            self.discard(written, e).await;
        }
        result
    }

    async fn assemble_into(
        &self,
        meta: &ContentTypeMeta,
        content_type: &str,
        decoded: DecodedBody,
        written: &mut Vec<PathBuf>,
    ) -> Result<ParseResult, ParseError> {
        match decoded {
            DecodedBody::Value { raw, .. } if self.options.save_body_to_file() => {
                let name = body_file_name(self.hint.as_deref(), meta.extension());
                let path = self.write(&name, &raw, written).await?;
                let file = FileData::new(name, content_type, raw.len() as u64, FileStorage::Disk(path));
                Ok(ParseResult::Files(Files::from([(UPLOADED_FILE_KEY.to_owned(), file)])))
            }
            DecodedBody::Value { value, .. } => Ok(match value {
                DecodedValue::Text(text) => ParseResult::Text(text),
                DecodedValue::Binary(bytes) => ParseResult::Raw(bytes),
                DecodedValue::Data(data) => ParseResult::Data(data),
            }),
            DecodedBody::Form(form) => self.assemble_form(form, written).await,
        }
    }

    /// Removes the files a failed call placed in the save directory.
    async fn discard(&self, written: Vec<PathBuf>, error: &ParseError) {
        for path in written {
            debug!(path = %path.display(), error = %error, "removing file of a failed parse");
            if let Err(e) = self.store.remove(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove file of a failed parse");
            }
        }
    }

    async fn assemble_form(&self, form: MultipartForm, written: &mut Vec<PathBuf>) -> Result<ParseResult, ParseError> {
        let MultipartForm { fields, files: parts } = form;
        let persist = self.options.save_body_to_file();

        let mut files = Files::new();
        for (field, part) in parts {
            let file = self.place_upload(part, persist, written).await?;
            files.insert(field, file);
        }

        if !persist {
            return Ok(ParseResult::Form { data: fields, files });
        }

        let key = if files.contains_key(UPLOADED_FILE_KEY) {
            format!("{UPLOADED_FILE_KEY}_{}", random_token())
        } else {
            UPLOADED_FILE_KEY.to_owned()
        };
        let contents = serde_json::to_vec(&Value::Object(fields))?;
        let name = format!("{}.{FIELDS_EXTENSION}", random_token());
        let path = self.write(&name, &contents, written).await?;
        files.insert(key, FileData::new(name, FIELDS_CONTENT_TYPE, contents.len() as u64, FileStorage::Disk(path)));

        Ok(ParseResult::Files(files))
    }

    /// Moves spilled uploads into the save directory; in-memory uploads are written there only
    /// when the whole body is persisted.
    async fn place_upload(
        &self,
        part: FilePart,
        persist: bool,
        written: &mut Vec<PathBuf>,
    ) -> Result<FileData, ParseError> {
        let FilePart { file_name, content_type, size, storage } = part;

        let storage = match storage {
            PartStorage::Memory(bytes) if !persist => FileStorage::Memory(bytes),
            PartStorage::Memory(bytes) => {
                let name = format!("{}.{}", random_token(), upload_extension(&file_name));
                FileStorage::Disk(self.write(&name, &bytes, written).await?)
            }
            PartStorage::Spilled(temp) => {
                let name = format!("{}.{}", random_token(), upload_extension(&file_name));
                FileStorage::Disk(self.rename(temp, &name, written).await?)
            }
        };

        Ok(FileData::new(file_name, content_type, size, storage))
    }

    async fn write(&self, name: &str, contents: &[u8], written: &mut Vec<PathBuf>) -> Result<PathBuf, ParseError> {
        let path = self.options.save_file_path().join(name);
        self.store.write(&path, contents).await?;
        written.push(path.clone());
        let path = self.store.canonicalize(&path).await?;
        info!(path = %path.display(), size = contents.len(), "persisted file");
        Ok(path)
    }

    async fn rename(&self, temp: TempPath, name: &str, written: &mut Vec<PathBuf>) -> Result<PathBuf, ParseError> {
        let path = self.options.save_file_path().join(name);
        self.store.rename(temp, &path).await?;
        written.push(path.clone());
        let path = self.store.canonicalize(&path).await?;
        info!(path = %path.display(), "moved spilled upload");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParseConfig;
    use crate::protocol::content_type::{MULTIPART_FORM_DATA, TEXT, UNKNOWN};
    use bytes::Bytes;
    use serde_json::{Map, json};
    use std::collections::{BTreeMap, HashSet};

    fn options(dir: &Path, save: bool) -> ParseOptions {
        ParseOptions::from(&ParseConfig::default().save_body_to_file(save).save_file_path(dir.to_string_lossy()))
    }

    fn text_body(text: &str) -> DecodedBody {
        DecodedBody::Value { value: DecodedValue::Text(text.to_owned()), raw: Bytes::from(text.to_owned()) }
    }

    fn memory_part(name: &str, content: &'static [u8]) -> FilePart {
        FilePart {
            file_name: name.to_owned(),
            content_type: "text/plain".to_owned(),
            size: content.len() as u64,
            storage: PartStorage::Memory(Bytes::from_static(content)),
        }
    }

    #[test]
    fn tokens_are_distinct() {
        let tokens: HashSet<_> = (0..1000).map(|_| random_token()).collect();
        assert_eq!(tokens.len(), 1000);
        assert!(tokens.iter().all(|t| t.len() == TOKEN_LEN && t.chars().all(|c| c.is_ascii_alphanumeric())));
    }

    #[test]
    fn hints() {
        let uri: Uri = "/upload?filename=report.csv".parse().unwrap();
        assert_eq!(file_name_hint(&uri).as_deref(), Some("report.csv"));

        let uri: Uri = "/upload?a=1&fileName=..%2F..%2Fetc%2Fpasswd".parse().unwrap();
        assert_eq!(file_name_hint(&uri).as_deref(), Some("passwd"));

        let uri: Uri = "/upload?filename=first&fileName=second".parse().unwrap();
        assert_eq!(file_name_hint(&uri).as_deref(), Some("first"));

        let uri: Uri = "/upload".parse().unwrap();
        assert_eq!(file_name_hint(&uri), None);
    }

    #[test]
    fn names() {
        assert_eq!(body_file_name(Some("report.csv"), "txt"), "report.csv");
        assert_eq!(body_file_name(Some("report"), "txt"), "report.txt");
        assert!(body_file_name(None, "json").ends_with(".json"));

        assert_eq!(upload_extension("me.png"), "png");
        assert_eq!(upload_extension("archive.tar.gz"), "gz");
        assert_eq!(upload_extension("README"), UNKNOWN_EXTENSION);
        assert_eq!(upload_extension(""), UNKNOWN_EXTENSION);
    }

    #[tokio::test]
    async fn in_memory_value() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path(), false);
        let assembler = Assembler::new(&LocalFileStore, &options, None);

        let result = assembler.assemble(&TEXT, "text/plain", text_body("hello")).await.unwrap();
        assert_eq!(result, ParseResult::Text("hello".to_owned()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn persisted_value() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path(), true);
        let assembler = Assembler::new(&LocalFileStore, &options, Some("greeting".to_owned()));

        let result = assembler.assemble(&UNKNOWN, "application/x-custom", text_body("hello")).await.unwrap();
        let file = &result.files().unwrap()[UPLOADED_FILE_KEY];
        assert_eq!(file.name(), "greeting.bin");
        assert_eq!(file.content_type(), "application/x-custom");
        assert_eq!(file.size(), 5);

        let path = file.path().unwrap();
        assert!(path.is_absolute());
        assert_eq!(path, dir.path().canonicalize().unwrap().join("greeting.bin"));
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn persisted_form() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path(), true);
        let assembler = Assembler::new(&LocalFileStore, &options, None);

        let mut fields = Map::new();
        fields.insert("a".to_owned(), json!(1));
        let files = BTreeMap::from([(UPLOADED_FILE_KEY.to_owned(), memory_part("notes.txt", b"notes"))]);
        let form = MultipartForm { fields, files };

        let result = assembler.assemble(&MULTIPART_FORM_DATA, "multipart/form-data", DecodedBody::Form(form)).await;
        let result = result.unwrap();
        assert!(result.data().is_none());
        let files = result.files().unwrap();
        assert_eq!(files.len(), 2);

        let upload = &files[UPLOADED_FILE_KEY];
        assert_eq!(upload.name(), "notes.txt");
        assert!(upload.path().unwrap().to_string_lossy().ends_with(".txt"));
        assert_eq!(std::fs::read(upload.path().unwrap()).unwrap(), b"notes");

        let (key, fields_file) = files.iter().find(|(key, _)| key.as_str() != UPLOADED_FILE_KEY).unwrap();
        assert!(key.starts_with("uploadedFile_"));
        assert_eq!(fields_file.content_type(), FIELDS_CONTENT_TYPE);
        let written: Value = serde_json::from_slice(&std::fs::read(fields_file.path().unwrap()).unwrap()).unwrap();
        assert_eq!(written, json!({"a": 1}));
    }

    #[tokio::test]
    async fn in_memory_form_keeps_content() {
        let options = ParseOptions::default();
        let assembler = Assembler::new(&LocalFileStore, &options, None);

        let files = BTreeMap::from([("doc".to_owned(), memory_part("doc.txt", b"abc"))]);
        let form = MultipartForm { fields: Map::new(), files };
        let result = assembler.assemble(&MULTIPART_FORM_DATA, "multipart/form-data", DecodedBody::Form(form)).await;
        let result = result.unwrap();

        let doc = &result.files().unwrap()["doc"];
        assert_eq!(doc.content().map(Bytes::as_ref), Some(&b"abc"[..]));
        assert_eq!(result.keys(), vec!["data", "files"]);
    }

    #[tokio::test]
    async fn write_errors_propagate() {
        let mut store = MockFileStore::new();
        store.expect_write().returning(|_, _| Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        store.expect_canonicalize().never();

        let options = ParseOptions::from(&ParseConfig::default().save_body_to_file(true));
        let assembler = Assembler::new(&store, &options, None);

        let err = assembler.assemble(&TEXT, "text/plain", text_body("hello")).await.unwrap_err();
        assert!(matches!(err, ParseError::Io { ref source } if source.kind() == io::ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn rename_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let temp = tempfile::NamedTempFile::new_in(dir.path()).unwrap().into_temp_path();
        let spilled = temp.to_path_buf();

        let mut store = MockFileStore::new();
        store.expect_rename().times(1).returning(|_, _| Err(io::Error::other("disk full")));

        let options = ParseOptions::default();
        let assembler = Assembler::new(&store, &options, None);

        let part = FilePart {
            file_name: "big.bin".to_owned(),
            content_type: "application/octet-stream".to_owned(),
            size: 0,
            storage: PartStorage::Spilled(temp),
        };
        let form = MultipartForm { fields: Map::new(), files: BTreeMap::from([("big".to_owned(), part)]) };

        let result = assembler.assemble(&MULTIPART_FORM_DATA, "multipart/form-data", DecodedBody::Form(form)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
        // the mock dropped the temp path, nothing is left behind
        assert!(!spilled.exists());
    }

    #[tokio::test]
    async fn failed_form_removes_written_files() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = MockFileStore::new();
        let mut writes = 0;
        store.expect_write().times(2).returning(move |path, contents| {
            writes += 1;
            if writes == 1 {
                std::fs::write(path, contents)
            } else {
                Err(io::Error::other("disk full"))
            }
        });
        store.expect_canonicalize().returning(|path| std::fs::canonicalize(path));
        store.expect_remove().times(1).returning(|path| std::fs::remove_file(path));

        let options = options(dir.path(), true);
        let assembler = Assembler::new(&store, &options, None);

        let mut fields = Map::new();
        fields.insert("a".to_owned(), json!(1));
        let files = BTreeMap::from([("doc".to_owned(), memory_part("doc.txt", b"abc"))]);
        let form = MultipartForm { fields, files };

        let result = assembler.assemble(&MULTIPART_FORM_DATA, "multipart/form-data", DecodedBody::Form(form)).await;
        assert!(matches!(result, Err(ParseError::Io { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_canonicalize_removes_written_body() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = MockFileStore::new();
        store.expect_write().times(1).returning(|path, contents| std::fs::write(path, contents));
        store.expect_canonicalize().returning(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        store.expect_remove().times(1).returning(|path| std::fs::remove_file(path));

        let options = options(dir.path(), true);
        let assembler = Assembler::new(&store, &options, None);

        let err = assembler.assemble(&TEXT, "text/plain", text_body("hello")).await.unwrap_err();
        assert!(matches!(err, ParseError::Io { ref source } if source.kind() == io::ErrorKind::PermissionDenied));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
