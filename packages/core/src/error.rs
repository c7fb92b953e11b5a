//! Error types for the record mapping and query layers.

use std::collections::BTreeMap;

/// Errors surfaced by schema construction, field access, serialization,
/// and the query layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A schema or field declaration is internally inconsistent.
    #[error("schema construction failed: {message}")]
    Construction { message: String },

    /// A single-valued binding matched more than one node.
    #[error("path '{path}' matched more than one node")]
    MultipleMatches { path: String },

    /// Extracted text could not be converted to the field's type.
    #[error("cannot convert '{value}' to {expected} for field '{field}'")]
    Conversion {
        field: String,
        value: String,
        expected: &'static str,
    },

    /// No finder is registered for this combination of filter names.
    #[error("no registered finder for argument names {key:?}")]
    NoRegisteredFinder { key: Vec<String> },

    /// A single-record lookup found nothing.
    #[error("{schema} matching query {args:?} does not exist")]
    DoesNotExist {
        schema: String,
        args: BTreeMap<String, String>,
    },

    /// The schema's payload form is not something the query layer can
    /// stream records out of.
    #[error("schema '{schema}' has no supported payload form for querying")]
    UnsupportedSchema { schema: String },

    /// A field name not declared on the schema.
    #[error("unknown field '{name}'")]
    UnknownField { name: String },

    /// A typed accessor was used against a value of another type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A schema's validation hook rejected the record.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The underlying XML tree layer failed.
    #[error(transparent)]
    Tree(#[from] xmlrecord_tree::Error),

    /// Fetching a remote document failed.
    #[error("transport error: {message}")]
    Transport { message: String },
}
