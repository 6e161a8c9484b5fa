use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;
use crate::backend::{compare_values, Document, FieldMatch, Filter};
use crate::engine::TransactionalStore;
use crate::query::{Backend, KeyIndex, Keyed, QueryResultSet, SortDirection};
use crate::{validate_key, BlobStore, Error, Result, StorageKey, StoreConfig};

/// Snapshot of every key in one collection.
#[derive(Debug, Clone, Default)]
pub struct PkIndex {
    keys: BTreeSet<StorageKey>,
}

impl KeyIndex for PkIndex {
    fn get_all_keys(&self) -> BTreeSet<StorageKey> {
        self.keys.clone()
    }
}

/// Stores [`Document`]s as JSON blobs, one [`TransactionalStore`] per
/// collection directory under the configured root.
///
/// Collection stores are opened on first use. Predicates are evaluated by
/// scanning the scoped keys; there are no secondary indexes.
pub struct FileBackend {
    config: StoreConfig,
    collections: RefCell<HashMap<String, String>>,
    stores: RefCell<BTreeMap<String, TransactionalStore>>,
}

impl FileBackend {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let root = config.root()?;
        if !root.exists() {
            fs::create_dir_all(root)?;
        }
        Ok(Self {
            config,
            collections: RefCell::new(HashMap::new()),
            stores: RefCell::new(BTreeMap::new()),
        })
    }

    /// Maps the logical type `cls` onto `collection`. Unregistered types use
    /// their own name.
    pub fn register(&self, cls: &str, collection: &str) -> Result<()> {
        validate_key(collection)?;
        self.collections.borrow_mut().insert(cls.to_string(), collection.to_string());
        Ok(())
    }

    fn with_store<T>(&self, collection: &str, f: impl FnOnce(&mut TransactionalStore) -> Result<T>) -> Result<T> {
        let mut stores = self.stores.borrow_mut();
        let store = match stores.entry(collection.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                validate_key(collection)?;
                debug!("opening collection {}", collection);
                e.insert(TransactionalStore::new(&self.config.child(collection)?)?)
            }
        };
        f(store)
    }

    /// Saves `doc`, assigning a fresh key when it has none. The write is
    /// buffered until [`commit`](Self::commit).
    pub fn save(&self, cls: &str, doc: &mut Document) -> Result<StorageKey> {
        let collection = self.get_collection_for_cls(cls)?;
        let key = match doc.storage_key() {
            Some(key) => key.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        let bytes = doc.to_bytes()?;
        self.with_store(&collection, |store| store.store(&key, &bytes))?;
        doc.set_storage_key(key.clone());
        Ok(key)
    }

    /// Every document of type `cls`, in key order.
    pub fn all(&self, cls: &str) -> Result<QueryResultSet<'_, Self>> {
        let collection = self.get_collection_for_cls(cls)?;
        let keys = self.with_store(&collection, |store| store.keys())?;
        Ok(QueryResultSet::new(self, cls, keys))
    }

    pub fn begin(&self) {
        for store in self.stores.borrow_mut().values_mut() {
            store.begin();
        }
    }

    /// Commits every open collection in name order. Stops at the first
    /// failure; collections committed before it stay committed.
    pub fn commit(&self) -> Result<()> {
        for store in self.stores.borrow_mut().values_mut() {
            store.commit()?;
        }
        Ok(())
    }

    pub fn rollback(&self) {
        for store in self.stores.borrow_mut().values_mut() {
            store.rollback();
        }
    }

    fn scoped_keys(&self, collection: &str, initial_keys: Option<&[StorageKey]>) -> Result<Vec<StorageKey>> {
        match initial_keys {
            Some(keys) => Ok(keys.to_vec()),
            None => self.with_store(collection, |store| store.keys()),
        }
    }

    fn matching(
        &self,
        cls: &str,
        initial_keys: Option<&[StorageKey]>,
        predicate: impl Fn(&Document) -> bool,
    ) -> Result<Vec<StorageKey>> {
        let collection = self.get_collection_for_cls(cls)?;
        let mut keys = Vec::new();
        for key in self.scoped_keys(&collection, initial_keys)? {
            match self.get_object(cls, &key) {
                Ok(doc) if predicate(&doc) => keys.push(key),
                Ok(_) => {}
                Err(Error::NotFound(_)) => debug!("skipping vanished key {}", key),
                Err(Error::Serialization(e)) => warn!("skipping unreadable document {} in {}: {}", key, collection, e),
                Err(e) => return Err(e),
            }
        }
        Ok(keys)
    }
}

impl Backend for FileBackend {
    type Object = Document;
    type Predicate = Filter;
    type Expression = FieldMatch;
    type Index = PkIndex;

    fn get_collection_for_cls(&self, cls: &str) -> Result<String> {
        Ok(self
            .collections
            .borrow()
            .get(cls)
            .cloned()
            .unwrap_or_else(|| cls.to_string()))
    }

    fn delete_by_store_keys(&self, collection: &str, keys: &[StorageKey]) -> Result<()> {
        self.with_store(collection, |store| {
            for key in keys {
                if !store.has(key)? {
                    debug!("{} already gone from {}", key, collection);
                    continue;
                }
                store.delete(key)?;
            }
            Ok(())
        })
    }

    fn filter<'a>(&'a self, cls: &str, predicate: &Filter, initial_keys: Option<&[StorageKey]>) -> Result<QueryResultSet<'a, Self>> {
        let keys = self.matching(cls, initial_keys, |doc| predicate.matches(doc))?;
        Ok(QueryResultSet::new(self, cls, keys))
    }

    fn filter_by_key<'a>(&'a self, cls: &str, expression: &FieldMatch, initial_keys: Option<&[StorageKey]>) -> Result<QueryResultSet<'a, Self>> {
        let keys = self.matching(cls, initial_keys, |doc| expression.matches(doc))?;
        Ok(QueryResultSet::new(self, cls, keys))
    }

    fn sort(&self, cls: &str, keys: &[StorageKey], sort_key: &str, direction: SortDirection) -> Result<Vec<StorageKey>> {
        let mut decorated = Vec::with_capacity(keys.len());
        for key in keys {
            let doc = self.get_object(cls, key)?;
            let value = doc.get(sort_key).cloned().unwrap_or(Value::Null);
            decorated.push((value, key.clone()));
        }
        decorated.sort_by(|(a, _), (b, _)| match direction {
            SortDirection::Ascending => compare_values(a, b),
            SortDirection::Descending => compare_values(b, a),
        });
        Ok(decorated.into_iter().map(|(_, key)| key).collect())
    }

    fn get_object(&self, cls: &str, key: &str) -> Result<Document> {
        let collection = self.get_collection_for_cls(cls)?;
        let bytes = self.with_store(&collection, |store| store.get(key))?;
        Ok(Document::from_bytes(&bytes)?.with_key(key))
    }

    fn get_pk_index(&self, collection: &str) -> Result<PkIndex> {
        let keys = self.with_store(collection, |store| store.keys())?;
        Ok(PkIndex { keys: keys.into_iter().collect() })
    }

    fn get_storage_key_for(&self, obj: &Document) -> Result<StorageKey> {
        obj.storage_key().map(str::to_string).ok_or(Error::IdentityUnresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FileStore;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_save_assigns_key() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();

        let mut d = doc(json!({"name": "a"}));
        let key = backend.save("user", &mut d).unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(d.storage_key(), Some(key.as_str()));

        let mut keyed = doc(json!({"name": "b"})).with_key("u2");
        assert_eq!(backend.save("user", &mut keyed).unwrap(), "u2");
    }

    #[test]
    fn test_commit_writes_collection_directory() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        backend.register("User", "users").unwrap();

        let mut d = doc(json!({"name": "a"})).with_key("u1");
        backend.save("User", &mut d).unwrap();
        assert!(!dir.path().join("users").join("u1").exists());

        backend.commit().unwrap();
        let raw = FileStore::new(&StoreConfig::new(dir.path().join("users"))).unwrap();
        assert_eq!(raw.get("u1").unwrap(), br#"{"name":"a"}"#);
    }

    #[test]
    fn test_rollback_discards_saves() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();

        backend.save("user", &mut doc(json!({"name": "a"})).with_key("u1")).unwrap();
        backend.rollback();
        assert!(backend.all("user").unwrap().is_empty());
    }

    #[test]
    fn test_filter_and_sort() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        for (key, name, age) in [("u1", "a", 30), ("u2", "b", 20), ("u3", "c", 30)] {
            backend.save("user", &mut doc(json!({"name": name, "age": age})).with_key(key)).unwrap();
        }

        let mut thirty = backend.filter("user", &Filter::new().eq("age", 30), None).unwrap();
        assert_eq!(thirty.keys(), ["u1", "u3"].map(String::from));

        thirty.sort("name", SortDirection::Descending).unwrap();
        assert_eq!(thirty.keys(), ["u3", "u1"].map(String::from));

        let by_age = backend.sort("user", &["u1", "u2", "u3"].map(String::from), "age", SortDirection::Ascending).unwrap();
        assert_eq!(by_age, ["u2", "u1", "u3"].map(String::from));

        let c = thirty.filter_by_key(&FieldMatch::new("name", "c")).unwrap();
        assert_eq!(c.keys(), ["u3".to_string()]);
    }

    #[test]
    fn test_filter_skips_unreadable_documents() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        backend.save("user", &mut doc(json!({"name": "a"})).with_key("u1")).unwrap();
        backend.commit().unwrap();
        fs::write(dir.path().join("user").join("junk"), b"not json").unwrap();

        let all = backend.filter("user", &Filter::new(), None).unwrap();
        assert_eq!(all.keys(), ["u1".to_string()]);
    }

    #[test]
    fn test_storage_key_for_unsaved() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        let d = doc(json!({"name": "a"}));
        assert!(matches!(backend.get_storage_key_for(&d), Err(Error::IdentityUnresolved)));
    }

    #[test]
    fn test_delete_skips_missing_keys() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        backend.save("user", &mut doc(json!({"name": "a"})).with_key("u1")).unwrap();

        backend.delete_by_store_keys("user", &["ghost", "u1", "u1"].map(String::from)).unwrap();
        assert!(backend.all("user").unwrap().is_empty());
    }

    #[test]
    fn test_delete_set_with_duplicate_keys() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        for key in ["u1", "u2"] {
            backend.save("user", &mut doc(json!({"name": key})).with_key(key)).unwrap();
        }
        backend.commit().unwrap();

        let mut dup = QueryResultSet::new(&backend, "user", ["u1", "u1", "u2"].map(String::from).to_vec());
        dup.delete().unwrap();
        assert!(dup.is_empty());

        backend.commit().unwrap();
        assert!(!dir.path().join("user").join("u1").exists());
        assert!(!dir.path().join("user").join("u2").exists());
    }

    #[test]
    fn test_delete_overlapping_sets() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        for key in ["u1", "u2"] {
            backend.save("user", &mut doc(json!({"name": key})).with_key(key)).unwrap();
        }
        backend.commit().unwrap();

        let mut all = backend.all("user").unwrap();
        let mut first = all.range(0, 1);
        first.delete().unwrap();
        all.delete().unwrap();
        assert!(all.is_empty());

        backend.commit().unwrap();
        assert!(backend.all("user").unwrap().is_empty());
    }

    #[test]
    fn test_commit_runs_in_collection_order() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        for collection in ["c", "a", "b"] {
            backend.save(collection, &mut doc(json!({"n": 1})).with_key("k")).unwrap();
        }
        // A directory squatting on b's key makes that collection's flush fail.
        fs::create_dir(dir.path().join("b").join("k")).unwrap();

        assert!(matches!(backend.commit(), Err(Error::StorageIo { .. })));
        assert!(dir.path().join("a").join("k").is_file());
        assert!(!dir.path().join("c").join("k").exists());
    }

    #[test]
    fn test_register_rejects_bad_collection() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(StoreConfig::new(dir.path())).unwrap();
        assert!(matches!(backend.register("User", "../up"), Err(Error::InvalidKey(_))));
    }
}
