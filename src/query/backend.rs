use std::collections::BTreeSet;
use crate::query::QueryResultSet;
use crate::{Result, StorageKey};

/// Ordering requested from [`Backend::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Objects that carry the storage key they were loaded from.
pub trait Keyed {
    fn storage_key(&self) -> Option<&str>;
    fn set_storage_key(&mut self, key: StorageKey);
}

/// Enumerates every key of one collection.
pub trait KeyIndex {
    fn get_all_keys(&self) -> BTreeSet<StorageKey>;
}

/// The services a [`QueryResultSet`] calls back into.
///
/// Implementations own predicate evaluation, indexes and object
/// (de)serialization; the result set only ever hands them keys. Methods take
/// `&self`, so a backend that mutates storage needs its own interior
/// mutability.
pub trait Backend: Sized {
    type Object: Keyed + Clone + PartialEq;
    /// Input to [`Backend::filter`].
    type Predicate;
    /// Input to [`Backend::filter_by_key`].
    type Expression;
    type Index: KeyIndex;

    /// Resolves the collection holding objects of logical type `cls`.
    fn get_collection_for_cls(&self, cls: &str) -> Result<String>;

    fn delete_by_store_keys(&self, collection: &str, keys: &[StorageKey]) -> Result<()>;

    /// Evaluates `predicate`, restricted to `initial_keys` when given.
    fn filter<'a>(
        &'a self,
        cls: &str,
        predicate: &Self::Predicate,
        initial_keys: Option<&[StorageKey]>,
    ) -> Result<QueryResultSet<'a, Self>>;

    /// Evaluates a single-field `expression`, restricted to `initial_keys` when given.
    fn filter_by_key<'a>(
        &'a self,
        cls: &str,
        expression: &Self::Expression,
        initial_keys: Option<&[StorageKey]>,
    ) -> Result<QueryResultSet<'a, Self>>;

    /// Returns `keys` reordered by the field `sort_key`.
    fn sort(&self, cls: &str, keys: &[StorageKey], sort_key: &str, direction: SortDirection) -> Result<Vec<StorageKey>>;

    /// Loads one object; fails with [`crate::Error::NotFound`] when the key no longer resolves.
    fn get_object(&self, cls: &str, key: &str) -> Result<Self::Object>;

    fn get_pk_index(&self, collection: &str) -> Result<Self::Index>;

    /// Fails with [`crate::Error::IdentityUnresolved`] when `obj` was never stored.
    fn get_storage_key_for(&self, obj: &Self::Object) -> Result<StorageKey>;
}
