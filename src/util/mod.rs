//! Utility functions shared by the parser and the command layer.
//!
//! - **Text processing**: lenient single-pass HTML entity decoding
//! - **URL validation**: rejects non-HTTP schemes and internal hosts

mod text;
mod url_validator;

pub use text::unescape_html;
pub use url_validator::{validate_url, UrlValidationError};
