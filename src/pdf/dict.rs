//! PDF dictionary implementation

use indexmap::IndexMap;
use super::{Object, ObjectId};

/// PDF dictionary object
///
/// Keys are stored without the leading slash. Insertion order is kept so
/// that a parsed dictionary serializes back with its keys in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: IndexMap<String, Object>,
}

impl Dictionary {
    /// Create new dictionary
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Create a dictionary with its `/Type` set
    pub fn with_type(type_name: &str) -> Self {
        let mut dict = Self::new();
        dict.set("Type", Object::name(type_name));
        dict
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get value by key
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries.get(key)
    }

    /// Get mutable value by key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.entries.get_mut(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set value, replacing any previous entry with the same key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Object>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove an entry, keeping the order of the remaining keys
    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.entries.shift_remove(key)
    }

    /// Get integer value
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Object::as_integer)
    }

    /// Get numeric value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Object::as_number)
    }

    /// Get name value
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Object::as_name)
    }

    /// Get string bytes
    pub fn get_string(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Object::as_string)
    }

    /// Get reference value
    pub fn get_reference(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Object::as_reference)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Object>> {
        self.get(key).and_then(Object::as_array)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Object::as_dict)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Object::as_bool)
    }

    /// Check the `/Type` entry
    pub fn type_is(&self, type_name: &str) -> bool {
        self.get_name("Type") == Some(type_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Object)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.entries.values_mut()
    }

    /// Visit every reference held by the dictionary values
    pub fn for_each_reference(&self, visit: &mut impl FnMut(ObjectId)) {
        for value in self.entries.values() {
            value.for_each_reference(visit);
        }
    }

    /// Replace every reference held by the dictionary values
    pub fn remap_references(&mut self, map: &mut impl FnMut(ObjectId) -> Object) {
        for value in self.entries.values_mut() {
            value.remap_references(map);
        }
    }

    /// Write dictionary to output
    pub fn write_to(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(b"<<");
        for (key, value) in &self.entries {
            Object::Name(key.clone()).write_to(output);
            output.push(b' ');
            value.write_to(output);
        }
        output.extend_from_slice(b">>");
    }
}

impl FromIterator<(String, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Object)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, Object);
    type IntoIter = indexmap::map::IntoIter<String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
