//! Insertion-ordered dict and set with Python key equality.
//!
//! Keys hash through `py_hash`, so `1`, `1.0` and `True` are the same key.
//! Removal uses `shift_remove` throughout: preserving insertion order is an
//! invariant, not an optimization target.

use std::hash::{Hash, Hasher};

use indexmap::{IndexMap, IndexSet};

use crate::{exc::PyExc, value::Value};

/// A hashed key wrapper: the original value plus its Python hash.
///
/// Equality is Python equality, so `d[True]` and `d[1]` address the same
/// entry. Construction fails for unhashable values.
#[derive(Debug, Clone)]
pub(crate) struct HKey {
    pub value: Value,
    hash: u64,
}

impl HKey {
    pub(crate) fn new(value: Value) -> Result<Self, PyExc> {
        let hash = value.py_hash()?;
        Ok(Self { value, hash })
    }
}

impl PartialEq for HKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.value.py_eq(&other.value)
    }
}

impl Eq for HKey {}

impl Hash for HKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// An insertion-ordered dictionary.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dict {
    entries: IndexMap<HKey, Value>,
}

impl Dict {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &Value) -> Result<Option<Value>, PyExc> {
        let key = HKey::new(key.clone())?;
        Ok(self.entries.get(&key).cloned())
    }

    pub(crate) fn contains(&self, key: &Value) -> Result<bool, PyExc> {
        let key = HKey::new(key.clone())?;
        Ok(self.entries.contains_key(&key))
    }

    /// Inserts preserving the original key's position on overwrite, like
    /// Python: re-assigning an existing key keeps its slot.
    pub(crate) fn insert(&mut self, key: Value, value: Value) -> Result<(), PyExc> {
        let key = HKey::new(key)?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &Value) -> Result<Option<Value>, PyExc> {
        let key = HKey::new(key.clone())?;
        Ok(self.entries.shift_remove(&key))
    }

    /// Removes and returns the most recently inserted pair (`popitem`).
    pub(crate) fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop().map(|(k, v)| (k.value, v))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (&k.value, v))
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.keys().map(|k| &k.value)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub(crate) fn py_eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries
            .iter()
            .all(|(k, v)| other.entries.get(k).is_some_and(|ov| v.py_eq(ov)))
    }
}

/// An unordered set (iteration follows insertion order, as a stable
/// deterministic choice).
#[derive(Debug, Clone, Default)]
pub(crate) struct Set {
    entries: IndexSet<HKey>,
}

impl Set {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, value: Value) -> Result<bool, PyExc> {
        let key = HKey::new(value)?;
        Ok(self.entries.insert(key))
    }

    pub(crate) fn contains(&self, value: &Value) -> Result<bool, PyExc> {
        let key = HKey::new(value.clone())?;
        Ok(self.entries.contains(&key))
    }

    pub(crate) fn remove(&mut self, value: &Value) -> Result<bool, PyExc> {
        let key = HKey::new(value.clone())?;
        Ok(self.entries.shift_remove(&key))
    }

    pub(crate) fn pop(&mut self) -> Option<Value> {
        self.entries.pop().map(|k| k.value)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|k| &k.value)
    }

    pub(crate) fn py_eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|k| other.entries.contains(k))
    }

    pub(crate) fn is_subset(&self, other: &Self) -> bool {
        self.entries.iter().all(|k| other.entries.contains(k))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cross_type_keys_collide() {
        let mut d = Dict::new();
        d.insert(Value::int(1), Value::str("int")).unwrap();
        d.insert(Value::Bool(true), Value::str("bool")).unwrap();
        d.insert(Value::Float(1.0), Value::str("float")).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.get(&Value::int(1)).unwrap().unwrap().py_str(), "float");
    }

    #[test]
    fn insertion_order_preserved() {
        let mut d = Dict::new();
        for key in ["b", "a", "c"] {
            d.insert(Value::str(key), Value::None).unwrap();
        }
        // Overwriting keeps the original slot.
        d.insert(Value::str("b"), Value::int(1)).unwrap();
        let keys: Vec<String> = d.keys().map(Value::py_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn removal_keeps_order() {
        let mut d = Dict::new();
        for key in ["a", "b", "c"] {
            d.insert(Value::str(key), Value::None).unwrap();
        }
        d.remove(&Value::str("b")).unwrap();
        let keys: Vec<String> = d.keys().map(Value::py_str).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn unhashable_key_rejected() {
        let mut d = Dict::new();
        let err = d.insert(Value::list(vec![]), Value::None).unwrap_err();
        assert!(err.message.contains("unhashable"));
    }

    #[test]
    fn tuple_keys_work() {
        let mut d = Dict::new();
        let k1 = Value::tuple(vec![Value::int(1), Value::str("a")]);
        let k2 = Value::tuple(vec![Value::int(1), Value::str("a")]);
        d.insert(k1, Value::int(42)).unwrap();
        assert_eq!(d.get(&k2).unwrap().unwrap().py_repr(), "42");
    }

    #[test]
    fn set_semantics() {
        let mut s = Set::new();
        assert!(s.insert(Value::int(1)).unwrap());
        assert!(!s.insert(Value::Float(1.0)).unwrap());
        assert!(s.contains(&Value::Bool(true)).unwrap());
        assert_eq!(s.len(), 1);
    }
}
