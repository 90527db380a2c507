use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BcsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("unknown script dialect `{0}`")]
    UnknownDialect(String),

    #[error("{0}")]
    Config(String),

    /// The syntax tree handed to the compiler cannot be used at all.
    #[error("line {line}, column {column}: {message}{}", expected_suffix(.expected))]
    Syntax {
        message: String,
        line: usize,
        column: usize,
        expected: Vec<String>,
    },

    #[error("resource is encrypted but no XOR key is configured")]
    MissingKey,
}

fn expected_suffix(expected: &[String]) -> String {
    if expected.is_empty() {
        String::new()
    } else {
        format!(" (expected one of: {})", expected.join(", "))
    }
}

pub type Result<T> = std::result::Result<T, BcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_lists_alternatives() {
        let err = BcsError::Syntax {
            message: "unexpected token `FOO`".into(),
            line: 3,
            column: 5,
            expected: vec!["IF".into(), "THEN".into()],
        };
        assert_eq!(
            err.to_string(),
            "line 3, column 5: unexpected token `FOO` (expected one of: IF, THEN)"
        );
    }
}
