//! Ordered key/value bag shared by event payloads, event metadata and
//! aggregate state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An insertion-ordered mapping from string keys to JSON values.
///
/// Assignment is merge-style: writing an existing key overwrites it in place,
/// writing an unseen key appends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from a JSON value.
    ///
    /// Objects keep their entries, `null` becomes an empty bag, and anything
    /// else is rejected by returning `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::new()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets `key`, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Merges `other` into `self`, overwriting shared keys.
    pub fn merge(&mut self, other: Attributes) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_existing_and_appends_new_keys() {
        let mut attrs: Attributes = [("a", json!(1)), ("b", json!(2))].into_iter().collect();
        attrs.merge([("b", json!(20)), ("c", json!(3))].into_iter().collect());

        let keys: Vec<_> = attrs.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(attrs.get("b"), Some(&json!(20)));
    }

    #[test]
    fn from_value_accepts_objects_and_null_only() {
        assert_eq!(Attributes::from_value(Value::Null), Some(Attributes::new()));
        assert_eq!(
            Attributes::from_value(json!({"x": 1})).unwrap().get("x"),
            Some(&json!(1))
        );
        assert!(Attributes::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut attrs: Attributes = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        attrs.remove("b");
        let keys: Vec<_> = attrs.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "c"]);
    }
}
