use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use log::debug;
use crate::query::{Backend, KeyIndex, Keyed, SortDirection};
use crate::{Error, Result, StorageKey};

/// An ordered list of storage keys with lazily materialized objects.
///
/// Objects are fetched from the backend on first access and cached per key.
/// Slicing and set algebra return new sets with an empty cache; `sort` and
/// `delete` act in place. Iteration is cursor based: once exhausted the set
/// keeps returning `None` from [`next_object`](Self::next_object) until
/// [`rewind`](Self::rewind) is called.
pub struct QueryResultSet<'a, B: Backend> {
    backend: &'a B,
    cls: String,
    keys: Vec<StorageKey>,
    objects: HashMap<StorageKey, B::Object>,
    cursor: usize,
}

impl<'a, B: Backend> QueryResultSet<'a, B> {
    pub fn new(backend: &'a B, cls: impl Into<String>, keys: Vec<StorageKey>) -> Self {
        Self {
            backend,
            cls: cls.into(),
            keys,
            objects: HashMap::new(),
            cursor: 0,
        }
    }

    fn clone_with(&self, keys: Vec<StorageKey>) -> Self {
        Self::new(self.backend, self.cls.clone(), keys)
    }

    /// The logical object type this set was produced for.
    pub fn collection_type(&self) -> &str {
        &self.cls
    }

    pub fn keys(&self) -> &[StorageKey] {
        &self.keys
    }

    /// Number of keys, not of materialized objects.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether the object for `key` has already been fetched.
    pub fn is_materialized(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Returns the object at position `index`, fetching it on first access.
    pub fn at(&mut self, index: usize) -> Result<&B::Object> {
        let key = self
            .keys
            .get(index)
            .ok_or(Error::IndexOutOfRange { index, len: self.keys.len() })?;
        let obj = match self.objects.entry(key.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let mut obj = self.backend.get_object(&self.cls, key)?;
                obj.set_storage_key(key.clone());
                e.insert(obj)
            }
        };
        Ok(obj)
    }

    /// A new set over `keys[start..end]`, clamped to the current length.
    pub fn range(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.keys.len());
        let start = start.min(end);
        self.clone_with(self.keys[start..end].to_vec())
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Advances the cursor and returns the object under it, or `None` once
    /// every key has been visited.
    pub fn next_object(&mut self) -> Option<Result<B::Object>> {
        if self.cursor >= self.keys.len() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        Some(self.at(index).cloned())
    }

    /// Iterates from the current cursor position to the end.
    pub fn objects(&mut self) -> Objects<'_, 'a, B> {
        Objects { set: self }
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.cls != other.cls {
            return Err(Error::IncompatibleSets { left: self.cls.clone(), right: other.cls.clone() });
        }
        Ok(())
    }

    /// Keys present in both sets, in this set's order.
    pub fn intersect(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let theirs: HashSet<&StorageKey> = other.keys.iter().collect();
        let mut seen = HashSet::new();
        let keys = self
            .keys
            .iter()
            .filter(|k| theirs.contains(k) && seen.insert(*k))
            .cloned()
            .collect();
        Ok(self.clone_with(keys))
    }

    /// Keys present in either set: this set's keys first, then the other's new ones.
    pub fn union(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let mut seen = HashSet::new();
        let keys = self
            .keys
            .iter()
            .chain(other.keys.iter())
            .filter(|k| seen.insert(*k))
            .cloned()
            .collect();
        Ok(self.clone_with(keys))
    }

    /// Every key of the owning collection that is not in this set.
    pub fn complement(&self) -> Result<Self> {
        let collection = self.backend.get_collection_for_cls(&self.cls)?;
        let all_keys = self.backend.get_pk_index(&collection)?.get_all_keys();
        let ours: HashSet<&StorageKey> = self.keys.iter().collect();
        let keys = all_keys.into_iter().filter(|k| !ours.contains(k)).collect();
        Ok(self.clone_with(keys))
    }

    /// Whether `obj` belongs to this set. Unsaved objects never do.
    pub fn contains(&self, obj: &B::Object) -> Result<bool> {
        self.contains_all(std::slice::from_ref(obj))
    }

    /// Whether every object in `objs` belongs to this set.
    pub fn contains_all(&self, objs: &[B::Object]) -> Result<bool> {
        let ours: HashSet<&str> = self.keys.iter().map(String::as_str).collect();
        for obj in objs {
            let key = match self.backend.get_storage_key_for(obj) {
                Ok(key) => key,
                Err(Error::IdentityUnresolved) => return Ok(false),
                Err(e) => return Err(e),
            };
            if !ours.contains(key.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Set equality: same logical type and the same keys, in any order.
    pub fn equals(&self, other: &Self) -> bool {
        if self.cls != other.cls {
            return false;
        }
        let ours: HashSet<&StorageKey> = self.keys.iter().collect();
        let theirs: HashSet<&StorageKey> = other.keys.iter().collect();
        ours == theirs
    }

    /// List equality: materializes every object and compares position by position.
    pub fn equals_objects(&mut self, objects: &[B::Object]) -> Result<bool> {
        if objects.len() != self.keys.len() {
            return Ok(false);
        }
        for (i, expected) in objects.iter().enumerate() {
            if self.at(i)? != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reorders the keys in place through the backend.
    pub fn sort(&mut self, sort_key: &str, direction: SortDirection) -> Result<&mut Self> {
        self.keys = self.backend.sort(&self.cls, &self.keys, sort_key, direction)?;
        Ok(self)
    }

    /// Deletes every object in the set and leaves the set empty.
    ///
    /// Objects handed out before the call are unaffected.
    pub fn delete(&mut self) -> Result<()> {
        let collection = self.backend.get_collection_for_cls(&self.cls)?;
        debug!("deleting {} keys from {}", self.keys.len(), collection);
        self.backend.delete_by_store_keys(&collection, &self.keys)?;
        self.keys.clear();
        self.objects.clear();
        self.cursor = 0;
        Ok(())
    }

    /// Narrows the set with a backend predicate.
    pub fn filter(&self, predicate: &B::Predicate) -> Result<QueryResultSet<'a, B>> {
        self.backend.filter(&self.cls, predicate, Some(self.keys.as_slice()))
    }

    /// Narrows the set with a single-field backend expression.
    pub fn filter_by_key(&self, expression: &B::Expression) -> Result<QueryResultSet<'a, B>> {
        self.backend.filter_by_key(&self.cls, expression, Some(self.keys.as_slice()))
    }
}

/// Borrowing iterator over a result set's cursor, see [`QueryResultSet::objects`].
pub struct Objects<'s, 'a, B: Backend> {
    set: &'s mut QueryResultSet<'a, B>,
}

impl<B: Backend> Iterator for Objects<'_, '_, B> {
    type Item = Result<B::Object>;

    fn next(&mut self) -> Option<Self::Item> {
        self.set.next_object()
    }
}

impl<B: Backend> PartialEq for QueryResultSet<'_, B> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<B: Backend> fmt::Debug for QueryResultSet<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResultSet")
            .field("cls", &self.cls)
            .field("keys", &self.keys)
            .field("cursor", &self.cursor)
            .finish()
    }
}
