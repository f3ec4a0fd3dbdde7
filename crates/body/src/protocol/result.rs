//! Values handed back to the caller.

use crate::protocol::OutputShape;
use bytes::Bytes;
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Key of the entry holding a body persisted as a whole.
pub const UPLOADED_FILE_KEY: &str = "uploadedFile";

/// Uploaded or persisted files keyed by form field name.
pub type Files = BTreeMap<String, FileData>;

/// Where the bytes of a [`FileData`] live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStorage {
    /// Content buffered in memory.
    Memory(Bytes),
    /// Content stored on disk at an absolute path.
    Disk(PathBuf),
}

/// A file extracted from a multipart body or written by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    name: String,
    content_type: String,
    size: u64,
    storage: FileStorage,
}

impl FileData {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, size: u64, storage: FileStorage) -> Self {
        Self { name: name.into(), content_type: content_type.into(), size, storage }
    }

    /// The original filename for uploads, the generated name for persisted bodies.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Number of bytes read, regardless of where they are stored.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn content(&self) -> Option<&Bytes> {
        match &self.storage {
            FileStorage::Memory(bytes) => Some(bytes),
            FileStorage::Disk(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            FileStorage::Memory(_) => None,
            FileStorage::Disk(path) => Some(path),
        }
    }
}

impl Serialize for FileData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FileData", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", &self.content_type)?;
        state.serialize_field("size", &self.size)?;
        match &self.storage {
            FileStorage::Memory(bytes) => state.serialize_field("content", bytes)?,
            FileStorage::Disk(path) => state.serialize_field("path", path)?,
        }
        state.end()
    }
}

/// The decoded body of a request.
///
/// Which variant comes back depends only on the content type's decoding strategy, whether the
/// body was persisted and whether a multipart body carried files, never on the content itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// Text bodies, unknown bodies read as text, XML left unconverted.
    Text(String),
    /// Binary bodies passed through.
    Raw(Bytes),
    /// JSON, url-encoded and flattened XML bodies.
    Data(Value),
    /// Multipart bodies kept in memory: plain fields plus uploaded files.
    Form { data: Map<String, Value>, files: Files },
    /// Bodies persisted to disk.
    Files(Files),
}

impl ParseResult {
    /// The top-level shape of this result; multipart forms report [`OutputShape::Data`].
    pub fn shape(&self) -> OutputShape {
        match self {
            ParseResult::Text(_) => OutputShape::Text,
            ParseResult::Raw(_) => OutputShape::Binary,
            ParseResult::Data(_) | ParseResult::Form { .. } => OutputShape::Data,
            ParseResult::Files(_) => OutputShape::Files,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ParseResult::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            ParseResult::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Structured data, for multipart forms the plain fields.
    pub fn data(&self) -> Option<Value> {
        match self {
            ParseResult::Data(value) => Some(value.clone()),
            ParseResult::Form { data, .. } => Some(Value::Object(data.clone())),
            _ => None,
        }
    }

    pub fn files(&self) -> Option<&Files> {
        match self {
            ParseResult::Form { files, .. } if !files.is_empty() => Some(files),
            ParseResult::Files(files) => Some(files),
            _ => None,
        }
    }

    /// Top-level keys this result serializes to.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = vec![self.shape().key()];
        if matches!(self, ParseResult::Form { files, .. } if !files.is_empty()) {
            keys.push(OutputShape::Files.key());
        }
        keys
    }
}

impl Serialize for ParseResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keys = self.keys();
        let mut map = serializer.serialize_map(Some(keys.len()))?;
        match self {
            ParseResult::Text(text) => map.serialize_entry(OutputShape::Text.key(), text)?,
            ParseResult::Raw(bytes) => map.serialize_entry(OutputShape::Binary.key(), bytes)?,
            ParseResult::Data(value) => map.serialize_entry(OutputShape::Data.key(), value)?,
            ParseResult::Form { data, files } => {
                map.serialize_entry(OutputShape::Data.key(), data)?;
                if !files.is_empty() {
                    map.serialize_entry(OutputShape::Files.key(), files)?;
                }
            }
            ParseResult::Files(files) => map.serialize_entry(OutputShape::Files.key(), files)?,
        }
        map.end()
    }
}
