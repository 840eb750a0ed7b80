use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{Equivalent, IndexMap};

use super::{str_hash, Value, DEFAULT_EQUALITY_DEPTH};

/// Magic key forming the prototype chain.
pub const ISA_KEY: &str = "__isa";

/// Hook invoked on every element assignment. Returning true means the
/// assignment was handled and the underlying store must not be mutated.
pub type AssignOverride = Rc<dyn Fn(&Value, &Value) -> bool>;

/// Map key wrapper that hashes and compares through the language's own value
/// semantics (fuzzy equality at the default recursion depth) instead of the
/// host default, so keys behave the same way `==` does in scripts.
#[derive(Clone, Debug)]
pub struct ValueKey(pub Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.equality(&other.0, DEFAULT_EQUALITY_DEPTH) == 1.0
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.0.hash(DEFAULT_EQUALITY_DEPTH));
    }
}

/// Borrowed lookup key for string indices. Hashes identically to a
/// `ValueKey` wrapping `Value::String`, so identifier lookups during the
/// prototype walk need no temporary allocation.
pub struct StrKey<'a>(pub &'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(str_hash(self.0));
    }
}

impl Equivalent<ValueKey> for StrKey<'_> {
    fn equivalent(&self, key: &ValueKey) -> bool {
        matches!(&key.0, Value::String(s) if &**s == self.0)
    }
}

/// Insertion-ordered mapping Value -> Value with interior mutability, shared
/// by reference between aliases (including closure environments).
pub struct ValMap {
    map: RefCell<IndexMap<ValueKey, Value>>,
    assign_override: RefCell<Option<AssignOverride>>,
}

impl ValMap {
    pub fn new() -> Self {
        Self {
            map: RefCell::new(IndexMap::new()),
            assign_override: RefCell::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.map.borrow().get(&ValueKey(key.clone())).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.map.borrow().get(&StrKey(key)).cloned()
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.map.borrow().contains_key(&ValueKey(key.clone()))
    }

    pub fn contains_str(&self, key: &str) -> bool {
        self.map.borrow().contains_key(&StrKey(key))
    }

    /// Raw insert, bypassing any assignment override.
    pub fn set(&self, key: Value, value: Value) {
        self.map.borrow_mut().insert(ValueKey(key), value);
    }

    /// Element assignment as scripts see it: the override hook, if any, gets
    /// first crack at the (key, value) pair.
    pub fn set_elem(&self, key: Value, value: Value) {
        let hook = self.assign_override.borrow().clone();
        if let Some(hook) = hook {
            if hook(&key, &value) {
                return;
            }
        }
        self.set(key, value);
    }

    /// Remove a key, preserving the order of the remaining entries.
    pub fn remove(&self, key: &Value) -> Option<Value> {
        self.map.borrow_mut().shift_remove(&ValueKey(key.clone()))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.map.borrow().keys().map(|k| k.0.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.map.borrow().values().cloned().collect()
    }

    /// Snapshot of all entries in insertion order.
    pub fn iter_pairs(&self) -> Vec<(Value, Value)> {
        self.map
            .borrow()
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }

    /// Entry at ordinal position `index` (insertion order).
    pub fn get_key_value_pair(&self, index: usize) -> Option<(Value, Value)> {
        self.map
            .borrow()
            .get_index(index)
            .map(|(k, v)| (k.0.clone(), v.clone()))
    }

    pub fn set_assign_override(&self, hook: Option<AssignOverride>) {
        *self.assign_override.borrow_mut() = hook;
    }
}

impl Default for ValMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // borrow may already be held during cyclic dumps
        match self.map.try_borrow() {
            Ok(map) => {
                let mut d = f.debug_map();
                for (k, v) in map.iter() {
                    d.entry(&k.0, v);
                }
                d.finish()
            }
            Err(_) => f.write_str("{...}"),
        }
    }
}
