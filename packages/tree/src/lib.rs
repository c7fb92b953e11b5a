//! xmlrecord-tree: the XML substrate for the record mapping layer.
//!
//! This crate owns everything that touches angle brackets:
//! - [`Document`] / [`Element`]: an owned, mutable element tree parsed
//!   from and serialized to text via quick-xml
//! - [`PathExpr`] / [`evaluate`]: the location-path subset used by field
//!   bindings (element steps, a trailing `@attr` selector, and `.`)
//! - [`Fragments`]: streaming extraction of repeated sub-elements from a
//!   fetched collection document
//!
//! The mapping layer in `xmlrecord-core` builds on these without caring
//! how the text is tokenized.

mod codec;
mod element;
mod error;
mod fragments;
mod path;

pub use element::{Document, Element, Node};
pub use error::Error;
pub use fragments::Fragments;
pub use path::{evaluate, PathExpr, PathMatch};
