//! L1 exact-match cache: SHA-256-prefix-keyed, insertion-ordered LRU map.
//!
//! Grounded on `original_source/router/cache.py`'s `_hash_prompt`
//! (`sha256(prompt)[:16]`) and `OrderedDict`-based move-to-front/evict-LRU
//! behavior.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::CacheEntry;

fn hash_prompt(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for b in bytes {
        if s.len() >= chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(chars);
    s
}

struct Slot {
    entry: CacheEntry,
}

/// Insertion-ordered exact-match cache. `order` tracks recency (front =
/// least recently used, back = most recently used) since `HashMap`
/// iteration order is not guaranteed.
pub struct L1Cache {
    max_size: usize,
    entries: HashMap<String, Slot>,
    order: Vec<String>,
}

impl L1Cache {
    pub fn new(max_size: usize) -> Self {
        Self { max_size, entries: HashMap::new(), order: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos);
            self.order.push(key);
        }
    }

    pub fn get(&mut self, prompt: &str) -> Option<CacheEntry> {
        let key = hash_prompt(prompt);
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.entry.hits += 1;
            let entry = slot.entry.clone();
            self.touch(&key);
            Some(entry)
        } else {
            None
        }
    }

    pub fn put(&mut self, prompt: &str, response: &str, model: &str) {
        let key = hash_prompt(prompt);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            if !self.order.is_empty() {
                let lru = self.order.remove(0);
                self.entries.remove(&lru);
            }
        }

        if self.entries.contains_key(&key) {
            self.touch(&key);
        } else {
            self.order.push(key.clone());
        }

        self.entries.insert(
            key,
            Slot { entry: CacheEntry { prompt: prompt.to_string(), response: response.to_string(), model: model.to_string(), hits: 0 } },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_same_response() {
        let mut cache = L1Cache::new(10);
        cache.put("p1", "r1", "m1");
        let e = cache.get("p1").unwrap();
        assert_eq!(e.response, "r1");
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let mut cache = L1Cache::new(2);
        cache.put("p1", "r1", "m");
        cache.put("p2", "r2", "m");
        cache.get("p1");
        cache.put("p3", "r3", "m");
        assert!(cache.get("p2").is_none());
        assert!(cache.get("p1").is_some());
        assert!(cache.get("p3").is_some());
    }

    #[test]
    fn hash_is_16_hex_chars() {
        assert_eq!(hash_prompt("anything").len(), 16);
    }
}
