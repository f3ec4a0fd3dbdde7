//! Best-effort flattening of XML into a JSON structure.
//!
//! This is not an XML parser. It scans the text for `<tag ...>content</tag>` and `<tag/>`
//! elements at the top level, then converts each element's content the same way:
//!
//! - an element whose content holds child elements becomes a nested object
//! - an element with plain content becomes its raw text
//! - an empty or self-closing element becomes `null`
//!
//! Siblings sharing a tag name overwrite each other, the last one wins. An element's content ends
//! at the last `</tag>` before the next `<tag` opening the same name. Attributes are skipped,
//! self-closing elements with attributes, comments, processing instructions and tag names that
//! are not made of word characters are ignored. Content may span lines.
//!
//! Elements nested deeper than [`MAX_DEPTH`] keep their content as raw text.
//!
//! Every `<` is indexed once up front, so the scan stays linear in the input for each level of
//! nesting it converts.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::Range;
use tracing::trace;

/// Nesting depth past which element content is no longer converted.
pub const MAX_DEPTH: usize = 128;

/// Flattens `xml` into an object keyed by tag name.
pub fn xml_to_json(xml: &str) -> Map<String, Value> {
    TagIndex::new(xml).convert(0..xml.len(), 1)
}

#[derive(Debug)]
struct Element<'a> {
    name: &'a str,
    /// `None` for self-closing elements.
    content: Option<Range<usize>>,
    /// Byte offset just past the element.
    end: usize,
}

/// Offsets of the tags in a document.
struct TagIndex<'a> {
    xml: &'a str,
    /// Every `<`, in order.
    starts: Vec<usize>,
    /// `<name`, by name.
    opens: HashMap<&'a str, Vec<usize>>,
    /// `</name>`, by name.
    closes: HashMap<&'a str, Vec<usize>>,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The run of word characters starting at `from`.
fn word_at(xml: &str, from: usize) -> &str {
    let len = xml.as_bytes()[from..].iter().take_while(|b| is_word_byte(**b)).count();
    &xml[from..from + len]
}

impl<'a> TagIndex<'a> {
    fn new(xml: &'a str) -> Self {
        let bytes = xml.as_bytes();
        let mut index = Self { xml, starts: Vec::new(), opens: HashMap::new(), closes: HashMap::new() };

        for (start, _) in xml.match_indices('<') {
            index.starts.push(start);
            index.opens.entry(word_at(xml, start + 1)).or_default().push(start);

            if bytes.get(start + 1) == Some(&b'/') {
                let name = word_at(xml, start + 2);
                if bytes.get(start + 2 + name.len()) == Some(&b'>') {
                    index.closes.entry(name).or_default().push(start);
                }
            }
        }

        index
    }

    /// Converts the elements found at the top level of `region`.
    fn convert(&self, region: Range<usize>, depth: usize) -> Map<String, Value> {
        let xml = self.xml;
        let text = &xml[..region.end];
        let mut json = Map::new();
        let mut next = self.starts.partition_point(|&p| p < region.start);

        while let Some(&start) = self.starts.get(next).filter(|&&p| p < region.end) {
            let Some(element) = self.match_element(text, start) else {
                next += 1;
                continue;
            };

            let value = match element.content {
                None => Value::Null,
                Some(content) if content.is_empty() => Value::Null,
                Some(content) if depth < MAX_DEPTH => {
                    let children = self.convert(content.clone(), depth + 1);
                    if children.is_empty() {
                        Value::String(xml[content].to_owned())
                    } else {
                        Value::Object(children)
                    }
                }
                Some(content) => {
                    trace!(tag = element.name, depth, "xml nesting too deep, keeping content as text");
                    Value::String(xml[content].to_owned())
                }
            };

            trace!(tag = element.name, "matched xml element");
            json.insert(element.name.to_owned(), value);
            next = self.starts.partition_point(|&p| p < element.end);
        }

        json
    }

    /// Tries to match an element starting at the `<` found at `start`.
    fn match_element(&self, text: &'a str, start: usize) -> Option<Element<'a>> {
        let name_end = start + 1 + word_at(text, start + 1).len();
        let name = &text[start + 1..name_end];

        self.match_open_close(text, name, name_end).or_else(|| match_self_closing(text, name, name_end))
    }

    /// `<name attrs>content</name>` where content never opens another `name`.
    fn match_open_close(&self, text: &str, name: &'a str, name_end: usize) -> Option<Element<'a>> {
        let bytes = text.as_bytes();
        let content_start = match *bytes.get(name_end)? {
            b'>' => name_end + 1,
            b if b.is_ascii_whitespace() => {
                // attributes run to the first `>`, a `<` before it leaves the tag unclosed
                let offset = bytes[name_end..].iter().position(|b| matches!(b, b'<' | b'>'))?;
                if bytes[name_end + offset] != b'>' {
                    return None;
                }
                name_end + offset + 1
            }
            _ => return None,
        };

        let limit = self.next_open(name, content_start).map_or(text.len(), |open| open.min(text.len()));
        let close_at = self.last_close(name, content_start, limit)?;

        Some(Element { name, content: Some(content_start..close_at), end: close_at + name.len() + 3 })
    }

    /// First `<name` at or after `from`.
    fn next_open(&self, name: &str, from: usize) -> Option<usize> {
        let opens = self.opens.get(name)?;
        opens.get(opens.partition_point(|&p| p < from)).copied()
    }

    /// Last `</name>` in `from..limit`.
    fn last_close(&self, name: &str, from: usize, limit: usize) -> Option<usize> {
        let closes = self.closes.get(name)?;
        let end = closes.partition_point(|&p| p < limit);
        closes[..end].last().copied().filter(|&p| p >= from)
    }
}

/// `<name />`
fn match_self_closing<'a>(text: &str, name: &'a str, name_end: usize) -> Option<Element<'a>> {
    let rest = &text[name_end..];
    let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if !trimmed.starts_with("/>") {
        return None;
    }

    let end = name_end + (rest.len() - trimmed.len()) + 2;
    Some(Element { name, content: None, end })
}
