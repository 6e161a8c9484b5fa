use std::cmp::Ordering;
use serde_json::Value;
use crate::backend::Document;

/// Equality on one field. A missing field compares as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub value: Value,
}

impl FieldMatch {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), value: value.into() }
    }

    /// Parses `field=value`. The value is read as JSON when it parses, as a
    /// plain string otherwise.
    pub fn parse(s: &str) -> Option<Self> {
        let (field, raw) = s.split_once('=')?;
        if field.is_empty() {
            return None;
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Some(Self::new(field, value))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field).unwrap_or(&Value::Null) == &self.value
    }
}

/// A conjunction of field matches. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<FieldMatch>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(FieldMatch::new(field, value));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|c| c.matches(doc))
    }
}

impl From<Vec<FieldMatch>> for Filter {
    fn from(clauses: Vec<FieldMatch>) -> Self {
        Self { clauses }
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting: null < bool < number < string, then
/// arrays and objects by their JSON text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse() {
        assert_eq!(FieldMatch::parse("age=30"), Some(FieldMatch::new("age", 30)));
        assert_eq!(FieldMatch::parse("name=alice"), Some(FieldMatch::new("name", "alice")));
        assert_eq!(FieldMatch::parse("name=\"30\""), Some(FieldMatch::new("name", "30")));
        assert_eq!(FieldMatch::parse("noequals"), None);
        assert_eq!(FieldMatch::parse("=x"), None);
    }

    #[test]
    fn test_filter_matches() {
        let doc = Document::from_value(json!({"name": "a", "age": 3})).unwrap();
        assert!(Filter::new().matches(&doc));
        assert!(Filter::new().eq("name", "a").eq("age", 3).matches(&doc));
        assert!(!Filter::new().eq("name", "a").eq("age", 4).matches(&doc));
        assert!(FieldMatch::new("missing", Value::Null).matches(&doc));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(99), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!([1])), Ordering::Equal);
    }
}
