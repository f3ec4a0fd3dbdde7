//! `application/x-www-form-urlencoded` decoding.

use crate::codec::value::coerce;
use serde_json::{Map, Value};

/// Decodes a url-encoded body into a map of coerced values.
///
/// Keys and values are percent-decoded, a key without `=` maps to an empty string and
/// duplicate keys keep their last value.
pub fn decode_form(body: &[u8]) -> Result<Map<String, Value>, serde_urlencoded::de::Error> {
    let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)?;

    let mut form = Map::with_capacity(pairs.len());
    for (key, value) in pairs {
        form.insert(key, coerce(&value));
    }
    Ok(form)
}
