//! Body decoders, one per content family.
//!
//! - [`multipart`]: streaming `multipart/form-data` splitter
//! - [`urlencoded`]: `application/x-www-form-urlencoded` pairs
//! - [`xml`]: best-effort XML flattening
//! - [`value`]: scalar coercion shared by form decoders

pub mod multipart;
pub mod urlencoded;
pub mod value;
pub mod xml;
