//! Parse errors for textual identifiers and amounts

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("Address must be 20 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidLength(19);
        assert_eq!(err.to_string(), "Address must be 20 bytes, got 19");
    }
}
