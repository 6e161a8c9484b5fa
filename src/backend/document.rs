use serde_json::{Map, Value};
use crate::query::Keyed;
use crate::{Result, StorageKey};

/// A schemaless JSON document.
///
/// The storage key is not part of the stored blob; it is attached when the
/// document is saved or loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    key: Option<StorageKey>,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { key: None, fields }
    }

    /// Builds an unsaved document from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Self::new(serde_json::from_value(value)?))
    }

    pub fn with_key(mut self, key: impl Into<StorageKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Looks up a field; dots descend into nested objects (`address.city`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(serde_json::from_slice(bytes)?))
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }
}

impl Keyed for Document {
    fn storage_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn set_storage_key(&mut self, key: StorageKey) {
        self.key = Some(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_get() {
        let doc = Document::from_value(json!({"name": "a", "address": {"city": "Berlin"}})).unwrap();
        assert_eq!(doc.get("name"), Some(&json!("a")));
        assert_eq!(doc.get("address.city"), Some(&json!("Berlin")));
        assert_eq!(doc.get("address.zip"), None);
        assert_eq!(doc.get("name.first"), None);
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Document::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_bytes_exclude_key() {
        let doc = Document::from_value(json!({"name": "a"})).unwrap().with_key("u1");
        let bytes = doc.to_bytes().unwrap();
        assert_eq!(bytes, br#"{"name":"a"}"#);

        let loaded = Document::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.storage_key(), None);
        assert_eq!(loaded.fields, doc.fields);
    }
}
