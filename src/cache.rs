//! Bounded read-through cache for transaction query replies
//!
//! Keys are `symbol:hash`. The cache is advisory: a poisoned lock or an
//! evicted entry is treated as a miss and the caller recomputes.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, V>,
    /// Least recently used first
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct TxCache<V> {
    capacity: usize,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> TxCache<V> {
    /// A capacity of zero disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn key(symbol: &str, hash: &str) -> String {
        format!("{symbol}:{hash}")
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock().ok()?;
        let value = state.entries.get(key).cloned()?;
        touch(&mut state.order, key);
        Some(value)
    }

    pub fn insert(&self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.entries.insert(key.clone(), value).is_some() {
            touch(&mut state.order, &key);
            return;
        }
        state.order.push_back(key);
        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.entries.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn touch(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        if let Some(k) = order.remove(pos) {
            order.push_back(k);
        }
    }
}
