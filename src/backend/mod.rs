//! A JSON document [`Backend`](crate::query::Backend) on top of the
//! transactional blob store.

pub mod document;
pub mod file_backend;
pub mod filter;

pub use document::Document;
pub use file_backend::{FileBackend, PkIndex};
pub use filter::{compare_values, FieldMatch, Filter};
