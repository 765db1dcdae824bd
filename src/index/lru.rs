//! Arena-backed LRU list with O(1) lookup, touch and removal
//!
//! Nodes live in a `Vec` and link to each other by index, so positions stay
//! stable while other nodes are removed (trim walks the list and evicts as it
//! goes). Head is the least recently used node.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct Lru<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    map: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Copy + Eq + Hash, V> Lru<K, V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            map: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.nodes.get(idx).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.nodes.get_mut(idx).and_then(|n| n.as_mut())
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.node(idx).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.node_mut(idx).map(|n| &mut n.value)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.node(idx) {
            Some(n) => (n.prev, n.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn link_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(n) = self.node_mut(idx) {
            n.prev = old_tail;
            n.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(n) = self.node_mut(t) {
                    n.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Move `key` to the tail (most recently used)
    pub fn touch(&mut self, key: &K) -> bool {
        let Some(&idx) = self.map.get(key) else {
            return false;
        };
        if self.tail != Some(idx) {
            self.unlink(idx);
            self.link_tail(idx);
        }
        true
    }

    /// Append a new key at the tail. Returns the value back if the key exists.
    pub fn push_back(&mut self, key: K, value: V) -> Result<(), V> {
        if self.map.contains_key(&key) {
            return Err(value);
        }
        let node = Node { key, value, prev: None, next: None };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.link_tail(idx);
        self.map.insert(key, idx);
        Ok(())
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = *self.map.get(key)?;
        self.remove_at(idx).map(|(_, v)| v)
    }

    /// Position of the least recently used node
    pub fn first(&self) -> Option<usize> {
        self.head
    }

    /// Position following `idx` towards the tail
    pub fn next(&self, idx: usize) -> Option<usize> {
        self.node(idx).and_then(|n| n.next)
    }

    pub fn at(&self, idx: usize) -> Option<(&K, &V)> {
        self.node(idx).map(|n| (&n.key, &n.value))
    }

    pub fn remove_at(&mut self, idx: usize) -> Option<(K, V)> {
        self.node(idx)?;
        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.free.push(idx);
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> Vec<K> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(idx) = cur {
            if let Some(n) = self.node(idx) {
                out.push(n.key);
                cur = n.next;
            } else {
                break;
            }
        }
        out
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.nodes.iter_mut().flatten().map(|n| &mut n.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_touch_order() {
        let mut lru: Lru<u32, &str> = Lru::new();
        lru.push_back(1, "a").unwrap();
        lru.push_back(2, "b").unwrap();
        lru.push_back(3, "c").unwrap();
        assert_eq!(lru.keys(), vec![1, 2, 3]);

        assert!(lru.touch(&1));
        assert_eq!(lru.keys(), vec![2, 3, 1]);
        assert!(!lru.touch(&9));

        assert_eq!(lru.push_back(2, "x"), Err("x"));
        assert_eq!(lru.get(&2), Some(&"b"));
    }

    #[test]
    fn test_remove_keeps_links_and_reuses_slots() {
        let mut lru: Lru<u32, u32> = Lru::new();
        for k in 0..5 {
            lru.push_back(k, k * 10).unwrap();
        }
        assert_eq!(lru.remove(&2), Some(20));
        assert_eq!(lru.remove(&0), Some(0));
        assert_eq!(lru.remove(&4), Some(40));
        assert_eq!(lru.keys(), vec![1, 3]);

        lru.push_back(7, 70).unwrap();
        assert_eq!(lru.keys(), vec![1, 3, 7]);
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn test_walk_and_evict() {
        let mut lru: Lru<u32, u32> = Lru::new();
        for k in 0..6 {
            lru.push_back(k, k).unwrap();
        }
        // evict odd keys while walking
        let mut cur = lru.first();
        while let Some(idx) = cur {
            cur = lru.next(idx);
            let odd = lru.at(idx).map(|(k, _)| k % 2 == 1).unwrap_or(false);
            if odd {
                lru.remove_at(idx);
            }
        }
        assert_eq!(lru.keys(), vec![0, 2, 4]);
    }

    #[test]
    fn test_remove_everything() {
        let mut lru: Lru<u32, u32> = Lru::new();
        lru.push_back(1, 1).unwrap();
        lru.push_back(2, 2).unwrap();
        lru.remove(&1);
        lru.remove(&2);
        assert!(lru.is_empty());
        assert_eq!(lru.first(), None);
        assert!(lru.keys().is_empty());
    }
}
