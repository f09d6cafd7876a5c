//! Hydrated instances and their related values.
//!
//! # Role
//!
//! An [`Instance`] is a dynamically shaped record: the model name, a
//! name-keyed set of validated field values, and a name-keyed set of
//! [`Related`] entries for eagerly loaded relations. Requested eager-load
//! paths always materialize an entry (an empty collection or `None`, never
//! a missing key), so application code can distinguish "loaded and empty"
//! from "never requested".
//!
//! # Example
//!
//! ```
//! use relata_core::instance::{Instance, Related};
//! use relata_core::value::Value;
//!
//! let mut book = Instance::new("Book");
//! book.set("id", Value::BigInt(1));
//! book.set("title", "Dune");
//! book.set_related("author", Related::One(None));
//! assert!(book.related("author").unwrap().is_empty());
//! ```

use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// An eagerly loaded relation value.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// To-one target; `None` when the foreign key was NULL or unmatched.
    One(Option<Box<Instance>>),
    /// To-many collection, possibly empty.
    Many(Vec<Instance>),
}

impl Related {
    /// True for `None` references and empty collections.
    pub fn is_empty(&self) -> bool {
        match self {
            Related::One(one) => one.is_none(),
            Related::Many(many) => many.is_empty(),
        }
    }

    /// The single instance of a to-one entry.
    pub fn as_one(&self) -> Option<&Instance> {
        match self {
            Related::One(one) => one.as_deref(),
            Related::Many(_) => None,
        }
    }

    /// The collection of a to-many entry.
    pub fn as_many(&self) -> Option<&[Instance]> {
        match self {
            Related::Many(many) => Some(many),
            Related::One(_) => None,
        }
    }
}

/// One hydrated (or to-be-persisted) record.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    model: String,
    values: BTreeMap<String, Value>,
    related: BTreeMap<String, Related>,
}

impl Instance {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            values: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    /// Build from `(field, value)` pairs.
    pub fn with_values<K, V, I>(model: impl Into<String>, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut instance = Self::new(model);
        for (k, v) in pairs {
            instance.set(k, v);
        }
        instance
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Set a field value, replacing any previous one.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Remove a field value, returning it.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Field values, name-ordered.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when the named field is absent or NULL. Used by the save path
    /// to decide between insert and update.
    pub fn is_unset(&self, field: &str) -> bool {
        match self.values.get(field) {
            None => true,
            Some(value) => value.is_null(),
        }
    }

    pub fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.related.insert(name.into(), related);
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    pub fn related_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.related.get_mut(name)
    }

    /// Loaded relation entries, name-ordered.
    pub fn related_entries(&self) -> impl Iterator<Item = (&str, &Related)> {
        self.related.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Remove a relation entry, returning it.
    pub fn take_related(&mut self, name: &str) -> Option<Related> {
        self.related.remove(name)
    }
}

impl Serialize for Instance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len() + self.related.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        for (k, related) in &self.related {
            match related {
                Related::One(one) => map.serialize_entry(k, one)?,
                Related::Many(many) => map.serialize_entry(k, many)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_round_trip() {
        let mut inst = Instance::new("Book");
        inst.set("title", "Dune");
        assert_eq!(inst.get("title"), Some(&Value::Text("Dune".into())));
        assert_eq!(inst.get("missing"), None);
    }

    #[test]
    fn test_is_unset_treats_null_as_unset() {
        let mut inst = Instance::new("Book");
        assert!(inst.is_unset("id"));
        inst.set("id", Value::Null);
        assert!(inst.is_unset("id"));
        inst.set("id", Value::BigInt(3));
        assert!(!inst.is_unset("id"));
    }

    #[test]
    fn test_related_entry_states() {
        let mut author = Instance::new("Author");
        author.set_related("books", Related::Many(Vec::new()));
        assert!(author.related("books").unwrap().is_empty());
        assert_eq!(author.related("books").unwrap().as_many(), Some(&[][..]));
        assert!(author.related("publisher").is_none());
    }

    #[test]
    fn test_serialize_nests_relations() {
        let mut book = Instance::with_values("Book", [("id", 1i64), ("title", 2i64)]);
        book.set("title", "Dune");
        let author = Instance::with_values("Author", [("id", 7i64)]);
        book.set_related("author", Related::One(Some(Box::new(author))));
        book.set_related("tags", Related::Many(Vec::new()));

        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["title"], "Dune");
        assert_eq!(json["author"]["id"], 7);
        assert_eq!(json["tags"], serde_json::json!([]));
    }

    #[test]
    fn test_serialize_null_reference() {
        let mut book = Instance::with_values("Book", [("id", 1i64)]);
        book.set_related("author", Related::One(None));
        let json = serde_json::to_value(&book).unwrap();
        assert!(json["author"].is_null());
    }
}
