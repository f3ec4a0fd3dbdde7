//! Per-call parser configuration.
//!
//! [`ParseConfig`] is what callers hand in: every field optional, deserializable from
//! camelCase keys. [`ParseOptions`] is the normalized form the parser works with, built
//! fresh for every call.

use serde::Deserialize;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

/// Default in-memory budget for multipart file content before spilling to disk (10 MiB).
pub const DEFAULT_MAX_MEMORY: usize = 10 << 20;

/// Default directory persisted files are written to.
pub const DEFAULT_SAVE_FILE_PATH: &str = "./";

/// Caller supplied options, unset fields take their defaults.
///
/// # Example
/// ```
/// # use micro_body::protocol::ParseConfig;
/// let config = ParseConfig::default().save_body_to_file(true).save_file_path("/var/tmp/uploads");
///
/// let config: ParseConfig = serde_json::from_str(r#"{"unknownAsText": true}"#).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParseConfig {
    pub unknown_as_text: Option<bool>,
    pub xml_to_json: Option<bool>,
    pub save_body_to_file: Option<bool>,
    pub save_file_path: Option<String>,
    pub max_memory: Option<usize>,
    pub temp_dir: Option<PathBuf>,
}

impl ParseConfig {
    #[must_use]
    pub fn unknown_as_text(mut self, value: bool) -> Self {
        self.unknown_as_text = Some(value);
        self
    }

    #[must_use]
    pub fn xml_to_json(mut self, value: bool) -> Self {
        self.xml_to_json = Some(value);
        self
    }

    #[must_use]
    pub fn save_body_to_file(mut self, value: bool) -> Self {
        self.save_body_to_file = Some(value);
        self
    }

    #[must_use]
    pub fn save_file_path(mut self, path: impl Into<String>) -> Self {
        self.save_file_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// Normalized options for a single parse call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    unknown_as_text: bool,
    xml_to_json: bool,
    save_body_to_file: bool,
    save_file_path: String,
    max_memory: usize,
    temp_dir: PathBuf,
}

impl ParseOptions {
    /// Treat content types missing from the registry as text instead of binary.
    pub fn unknown_as_text(&self) -> bool {
        self.unknown_as_text
    }

    /// Flatten XML bodies into a structure instead of returning the text.
    pub fn xml_to_json(&self) -> bool {
        self.xml_to_json
    }

    /// Persist the decoded payload to disk instead of returning it in memory.
    pub fn save_body_to_file(&self) -> bool {
        self.save_body_to_file
    }

    /// Directory persisted files go to, always ends with a path separator.
    pub fn save_file_path(&self) -> &Path {
        Path::new(&self.save_file_path)
    }

    /// In-memory budget for multipart file content.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Directory multipart files spill into once `max_memory` is exceeded.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::from(&ParseConfig::default())
    }
}

impl From<&ParseConfig> for ParseOptions {
    fn from(config: &ParseConfig) -> Self {
        let mut save_file_path = config
            .save_file_path
            .clone()
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| DEFAULT_SAVE_FILE_PATH.to_owned());
        if !save_file_path.ends_with(['/', MAIN_SEPARATOR]) {
            save_file_path.push(MAIN_SEPARATOR);
        }

        Self {
            unknown_as_text: config.unknown_as_text.unwrap_or(false),
            xml_to_json: config.xml_to_json.unwrap_or(true),
            save_body_to_file: config.save_body_to_file.unwrap_or(false),
            save_file_path,
            max_memory: config.max_memory.unwrap_or(DEFAULT_MAX_MEMORY),
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }
}
