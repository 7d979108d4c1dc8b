//! Bounded least-recently-used cache for resolved routes.
//!
//! Keys are `"{method}\0{path}"`. Every hit and every insert stamps the entry
//! with a fresh tick; eviction removes the entry with the oldest tick.

use std::collections::{BTreeMap, HashMap};

use log::debug;

/// LRU map with a fixed capacity. A capacity of 0 disables caching.
#[derive(Debug, Clone)]
pub struct RouteCache<V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, (u64, V)>,
    // tick -> key, oldest first
    order: BTreeMap<u64, String>,
}

impl<V: Clone> RouteCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Cache key for a request.
    pub fn key(method: &str, path: &str) -> String {
        format!("{method}\0{path}")
    }

    /// Look an entry up and mark it most recently used.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let tick = self.next_tick();
        let (stamp, value) = self.entries.get_mut(key)?;
        self.order.remove(&*stamp);
        *stamp = tick;
        self.order.insert(tick, key.to_string());
        Some(value.clone())
    }

    /// Insert an entry, evicting the least recently used one when full.
    pub fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some((stamp, _)) = self.entries.remove(&key) {
            self.order.remove(&stamp);
        }
        while self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        let tick = self.next_tick();
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (tick, value));
    }

    /// Change the capacity, evicting from the cold end if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            self.evict_lru();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn evict_lru(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            debug!("Evicting cached route {:?}", key.replace('\0', " "));
            self.entries.remove(&key);
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
