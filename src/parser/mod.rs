//! Decoding helpers: header values, dates, charsets, and MIME structure.

pub mod charset;
pub mod date;
pub mod header;
pub mod mime;
