//! `multipart/form-data` support.
//!
//! [`MultipartDecoder`] splits a body into [`MultipartItem`]s, [`boundary`] pulls the boundary
//! out of a `content-type` header value.

mod multipart_decoder;
mod part_header;

pub use multipart_decoder::MAX_BOUNDARY_SIZE;
pub use multipart_decoder::MAX_PART_HEADER_SIZE;
pub use multipart_decoder::MultipartDecoder;
pub use multipart_decoder::MultipartItem;
pub use part_header::DEFAULT_FILE_CONTENT_TYPE;
pub use part_header::PartHeader;

use mime::Mime;

/// Extracts the `boundary` parameter of a `multipart/form-data` content type.
///
/// Returns `None` when the parameter is absent or empty.
pub fn boundary(content_type: &str) -> Option<String> {
    let boundary = match content_type.parse::<Mime>() {
        Ok(mime) => mime.get_param(mime::BOUNDARY).map(|value| value.as_str().to_owned()),
        // boundaries may hold characters `mime` rejects in unquoted parameters
        Err(_) => content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim().eq_ignore_ascii_case("boundary").then(|| value.trim().to_owned())
        }),
    }?;

    let boundary = boundary.trim_matches('"');
    (!boundary.is_empty()).then(|| boundary.to_owned())
}
