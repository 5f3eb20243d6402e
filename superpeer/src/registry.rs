//! The super-peer's file registry: `file name -> set of leaf addresses that advertise it`,
//! plus the reverse index needed to cascade-deregister everything a disconnecting leaf
//! advertised.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use common::Address;

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, HashSet<Address>>,
    by_leaf: HashMap<Address, HashSet<String>>,
}

/// Concurrent mapping of file name to the set of leaves advertising it. All mutations are
/// single-key (or, for disconnect cascades, a bounded number of keys for one leaf) and are
/// performed under one lock, matching the corpus's `Arc<Mutex<...>>` idiom for small shared
/// maps that are never held across an `.await`.
pub struct LeafRegistry {
    inner: Mutex<Inner>,
}

impl LeafRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Announces that `leaf` advertises `name`. Idempotent.
    pub fn register(&self, name: &str, leaf: Address) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_name.entry(name.to_string()).or_default().insert(leaf.clone());
        inner.by_leaf.entry(leaf).or_default().insert(name.to_string());
    }

    /// Retracts `leaf`'s advertisement of `name`. If the set becomes empty the key is removed,
    /// per the registry invariant.
    pub fn deregister(&self, name: &str, leaf: &Address) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(holders) = inner.by_name.get_mut(name) {
            holders.remove(leaf);
            if holders.is_empty() {
                inner.by_name.remove(name);
            }
        }
        if let Some(names) = inner.by_leaf.get_mut(leaf) {
            names.remove(name);
            if names.is_empty() {
                inner.by_leaf.remove(leaf);
            }
        }
    }

    /// Retracts every advertisement `leaf` has made, e.g. on connection close.
    pub fn deregister_all(&self, leaf: &Address) {
        let mut inner = self.inner.lock().unwrap();
        let Some(names) = inner.by_leaf.remove(leaf) else {
            return;
        };
        for name in names {
            if let Some(holders) = inner.by_name.get_mut(&name) {
                holders.remove(leaf);
                if holders.is_empty() {
                    inner.by_name.remove(&name);
                }
            }
        }
    }

    /// All leaves currently advertising `name`, in an unspecified but stable iteration order.
    pub fn holders(&self, name: &str) -> Vec<Address> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_name
            .get(name)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str, leaf: &Address) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .by_name
            .get(name)
            .map(|s| s.contains(leaf))
            .unwrap_or(false)
    }
}

impl Default for LeafRegistry {
    fn default() -> Self {
        Self::new()
    }
}
