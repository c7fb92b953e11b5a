//! xmlrecord-http: the real network behind the query layer.
//!
//! [`HttpTransport`] implements `xmlrecord_core::Transport` over a
//! blocking reqwest client. Everything interesting about URL resolution
//! and caching lives in the core crate; this one only executes fetches.

mod blocking;
mod error;

pub use blocking::HttpTransport;
pub use error::Error;
