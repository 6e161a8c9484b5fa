pub mod file_store;
pub mod transactional;

pub use file_store::FileStore;
pub use transactional::TransactionalStore;
