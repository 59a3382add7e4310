mod error;
mod grammar;

pub use error::ParseError;

use crate::types::{AttrPath, TemplatePart};

/// Parse template text into literal and placeholder parts.
///
/// # Errors
///
/// Returns [`ParseError`] on an unterminated or malformed placeholder, or a
/// stray `}`.
pub(crate) fn parse_template(input: &str) -> Result<Vec<TemplatePart>, ParseError> {
    use winnow::Parser;
    grammar::template
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}

/// Parse a `getAttr` path such as `authority` or `parts[0]`.
///
/// # Errors
///
/// Returns [`ParseError`] if the path is empty or malformed.
pub(crate) fn parse_attr_path(input: &str) -> Result<AttrPath, ParseError> {
    use winnow::Parser;
    grammar::attr_path
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}
