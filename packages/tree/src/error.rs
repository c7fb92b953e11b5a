//! Error types for the tree layer.

/// Errors produced while parsing, evaluating paths against, or writing
/// XML trees.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The input text is not well-formed XML.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The document contained no root element.
    #[error("document has no root element")]
    NoRoot,

    /// A location path could not be parsed.
    #[error("invalid path expression '{expression}': {message}")]
    InvalidPath { expression: String, message: String },

    /// Writing serialized output failed.
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}
