//! Lazy query results and the backend they are evaluated against.

pub mod backend;
pub mod result_set;

pub use backend::{Backend, KeyIndex, Keyed, SortDirection};
pub use result_set::{Objects, QueryResultSet};
