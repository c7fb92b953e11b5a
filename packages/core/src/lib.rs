//! xmlrecord-core: declarative mapping between typed record schemas and
//! XML documents.
//!
//! A [`Schema`] declares named, typed fields bound to location paths,
//! plus the query configuration (finder URL templates, a collection
//! wrapper tag, fetch headers, a validation hook). A [`Record`] is a
//! lazily-decoded view over one document: the source parses on first
//! access, each field decodes once and is cached, and [`Record::to_xml`]
//! replays only the touched fields onto the tree so unknown content
//! passes through untouched.
//!
//! The [`QueryManager`] resolves filter argument sets to fetch URLs via
//! the schema's finders and streams repeated sub-elements of collection
//! responses back out as records. It talks to the network only through
//! the [`Transport`] seam; `xmlrecord-http` supplies the real client.
//!
//! ```no_run
//! use std::sync::Arc;
//! use xmlrecord_core::{FieldDecl, QueryManager, Schema, Transport};
//!
//! fn fetch_gonzo(transport: Arc<dyn Transport>) -> Result<(), xmlrecord_core::Error> {
//!     let schema = Schema::builder("Muppet")
//!         .field("name", FieldDecl::char("/muppet/name"))
//!         .field("age", FieldDecl::int("/muppet/age"))
//!         .finder(&["name"], "http://api/muppets/%s")
//!         .build()?;
//!     let manager = QueryManager::new(schema, transport)?;
//!     let muppet = manager.get(&[("name", "Gonzo")])?;
//!     println!("{:?}", muppet.get_int("age")?);
//!     Ok(())
//! }
//! ```

mod error;
mod field;
mod query;
mod record;
mod schema;
mod serialize;
mod transport;
mod value;

pub use error::Error;
pub use field::{ElementKind, FieldDecl, FieldKind, FieldSpec};
pub use query::{QueryManager, RecordIter, RecordQuery};
pub use record::Record;
pub use schema::{Payload, Schema, SchemaBuilder, Validator};
pub use transport::{FetchResponse, RecordedCall, StubTransport, Transport};
pub use value::Value;

pub use xmlrecord_tree as tree;
