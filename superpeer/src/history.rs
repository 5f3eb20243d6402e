//! The super-peer's bounded message history: used both for flood dedup and for reverse-path
//! routing of queryhits back toward the originating leaf.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use common::Address;

struct Inner {
    order: VecDeque<String>,
    return_addr: HashMap<String, Address>,
}

/// An ordered, bounded `message_id -> return_address` mapping, capacity [`common::HISTORY_CAPACITY`].
/// Insert, contains-check, and eviction are atomic with respect to each other (single lock),
/// since a query's dedup check and its history insert must not race with a concurrent arrival
/// of the same message_id from another neighbor.
pub struct MessageHistory {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::with_capacity(common::HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity),
                return_addr: HashMap::new(),
            }),
        }
    }

    /// If `message_id` has already been recorded, returns `false` (caller should drop the
    /// message as a duplicate). Otherwise records it with `return_addr` and returns `true`,
    /// evicting the oldest entry first if at capacity.
    pub fn try_record(&self, message_id: &str, return_addr: Address) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.return_addr.contains_key(message_id) {
            return false;
        }
        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.return_addr.remove(&oldest);
            }
        }
        inner.order.push_back(message_id.to_string());
        inner.return_addr.insert(message_id.to_string(), return_addr);
        true
    }

    /// The address a queryhit for `message_id` should be routed back to, or `None` if the
    /// entry was evicted (or never recorded).
    pub fn return_address(&self, message_id: &str) -> Option<Address> {
        let inner = self.inner.lock().unwrap();
        inner.return_addr.get(message_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}
