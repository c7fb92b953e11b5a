//! xmlrecord: declarative mapping between typed record schemas and XML
//! documents behind REST endpoints.
//!
//! Declare a [`Schema`] once; read [`Record`]s lazily off documents and
//! write touched fields back without disturbing unknown content; resolve
//! filter sets to URLs through registered finders and stream collection
//! responses record by record.
//!
//! This crate re-exports the whole stack: the mapping and query layers
//! from `xmlrecord-core`, the blocking HTTP transport from
//! `xmlrecord-http`, and the XML tree primitives from `xmlrecord-tree`
//! under [`tree`].

pub use xmlrecord_core::{
    ElementKind, Error, FetchResponse, FieldDecl, FieldKind, FieldSpec, Payload, QueryManager,
    Record, RecordIter, RecordQuery, RecordedCall, Schema, SchemaBuilder, StubTransport,
    Transport, Validator, Value,
};
pub use xmlrecord_http::HttpTransport;
pub use xmlrecord_tree as tree;
