//! Codec module - line encoding/decoding.
//!
//! - [`JsonLineCodec`] - two-element JSON arrays, one per line
//!
//! Codecs are marker structs with static methods.

mod json_line;

pub use json_line::JsonLineCodec;
