//! Header block of a single multipart part.

use crate::protocol::MultipartError;
use crate::utils::ensure;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};

/// Content type assumed for file parts that do not declare one.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// The parsed headers of one part, taken from its `Content-Disposition` and `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartHeader {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    headers: HeaderMap,
}

impl PartHeader {
    /// Parses a header block, without the blank line terminating it.
    pub fn parse(block: &[u8]) -> Result<Self, MultipartError> {
        let mut headers = HeaderMap::new();

        for line in block.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            let colon = line
                .iter()
                .position(|b| *b == b':')
                .ok_or_else(|| MultipartError::invalid_header("header line without colon"))?;

            let name = HeaderName::from_bytes(line[..colon].trim_ascii()).map_err(MultipartError::invalid_header)?;
            let value =
                HeaderValue::from_bytes(line[colon + 1..].trim_ascii()).map_err(MultipartError::invalid_header)?;
            headers.append(name, value);
        }

        let disposition = headers.get(CONTENT_DISPOSITION).ok_or(MultipartError::MissingContentDisposition)?;
        let (name, file_name) = parse_content_disposition(&String::from_utf8_lossy(disposition.as_bytes()))?;

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        Ok(Self { name, file_name, content_type, headers })
    }

    /// The form field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The uploaded file name, present only for file parts.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// The declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The declared content type, falling back to `application/octet-stream`.
    pub fn file_content_type(&self) -> &str {
        self.content_type().unwrap_or(DEFAULT_FILE_CONTENT_TYPE)
    }

    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Parses `form-data; name="field"; filename="a.txt"` into the field name and optional file name.
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), MultipartError> {
    let mut params = split_params(value).into_iter();

    let disposition = params.next().unwrap_or_default().trim();
    ensure!(
        disposition.eq_ignore_ascii_case("form-data"),
        MultipartError::invalid_header(format!("unsupported content-disposition `{disposition}`"))
    );

    let mut name = None;
    let mut file_name = None;
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw));
        } else if key.eq_ignore_ascii_case("filename") {
            file_name = Some(unquote(raw));
        }
    }

    let name = name.ok_or(MultipartError::MissingName)?;
    Ok((name, file_name))
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut unescaped = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => unescaped.extend(chars.next()),
                    c => unescaped.push(c),
                }
            }
            unescaped
        }
        None => value.to_owned(),
    }
}
