//! Fixed-capacity buffer for items under active attention.

use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;

use crate::error::{StrataError, StrataResult};
use crate::types::{MemoryItem, Tier};

type SlotKey = (OrderedFloat<f32>, u64);

/// Bounded, priority-ordered holding area. Never persisted.
///
/// When full, `offer` evicts the lowest-priority resident (oldest first on
/// ties) and hands it back so the caller can demote it to the fresh buffer.
#[derive(Debug)]
pub struct FocusBuffer {
    capacity: usize,
    slots: BTreeMap<SlotKey, MemoryItem>,
    index: HashMap<String, SlotKey>,
    seq: u64,
}

impl FocusBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: BTreeMap::new(),
            index: HashMap::new(),
            seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Insert an item, returning the resident evicted to make room.
    ///
    /// Re-offering a resident replaces it in place and evicts nothing.
    pub fn offer(&mut self, mut item: MemoryItem) -> StrataResult<Option<MemoryItem>> {
        if self.capacity == 0 {
            return Err(StrataError::CapacityExceeded {
                buffer: Tier::Focus.to_string(),
                capacity: 0,
            });
        }
        item.tier = Tier::Focus;

        let replaced = self.take(&item.id).is_some();
        let evicted = if !replaced && self.slots.len() >= self.capacity {
            let lowest = self.slots.keys().next().copied();
            match lowest.and_then(|key| self.slots.remove(&key)) {
                Some(evicted) => {
                    self.index.remove(&evicted.id);
                    Some(evicted)
                }
                None => {
                    return Err(StrataError::CapacityExceeded {
                        buffer: Tier::Focus.to_string(),
                        capacity: self.capacity,
                    })
                }
            }
        } else {
            None
        };

        self.insert(item);
        Ok(evicted)
    }

    fn insert(&mut self, item: MemoryItem) {
        self.seq += 1;
        let key = (OrderedFloat(item.priority), self.seq);
        self.index.insert(item.id.clone(), key);
        self.slots.insert(key, item);
    }

    /// Residents, highest priority first.
    pub fn peek_all(&self) -> Vec<MemoryItem> {
        self.slots.values().rev().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.index.get(id).and_then(|key| self.slots.get(key))
    }

    /// Remove a resident.
    pub fn take(&mut self, id: &str) -> Option<MemoryItem> {
        let key = self.index.remove(id)?;
        self.slots.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, priority: f32) -> MemoryItem {
        let now = Utc::now();
        let mut i = MemoryItem::new(id, id, "agent-a", now, now);
        i.priority = priority;
        i
    }

    #[test]
    fn test_insert_below_capacity() {
        let mut focus = FocusBuffer::new(3);
        assert!(focus.offer(item("a", 0.9)).unwrap().is_none());
        assert!(focus.offer(item("b", 0.95)).unwrap().is_none());
        assert_eq!(focus.len(), 2);
        assert_eq!(focus.get("a").unwrap().tier, Tier::Focus);
    }

    #[test]
    fn test_full_buffer_evicts_lowest() {
        let mut focus = FocusBuffer::new(2);
        focus.offer(item("a", 0.9)).unwrap();
        focus.offer(item("b", 0.86)).unwrap();
        let evicted = focus.offer(item("c", 0.99)).unwrap().unwrap();
        assert_eq!(evicted.id, "b");
        assert_eq!(focus.len(), 2);
        assert!(!focus.contains("b"));
    }

    #[test]
    fn test_newcomer_is_admitted_even_when_lowest() {
        let mut focus = FocusBuffer::new(2);
        focus.offer(item("a", 0.95)).unwrap();
        focus.offer(item("b", 0.9)).unwrap();
        let evicted = focus.offer(item("c", 0.86)).unwrap().unwrap();
        assert_eq!(evicted.id, "b");
        assert!(focus.contains("c"));
    }

    #[test]
    fn test_ties_evict_oldest() {
        let mut focus = FocusBuffer::new(2);
        focus.offer(item("old", 0.9)).unwrap();
        focus.offer(item("new", 0.9)).unwrap();
        let evicted = focus.offer(item("x", 0.95)).unwrap().unwrap();
        assert_eq!(evicted.id, "old");
    }

    #[test]
    fn test_peek_all_in_priority_order() {
        let mut focus = FocusBuffer::new(5);
        focus.offer(item("a", 0.87)).unwrap();
        focus.offer(item("b", 0.99)).unwrap();
        focus.offer(item("c", 0.9)).unwrap();
        let ids: Vec<String> = focus.peek_all().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_reoffer_replaces_in_place() {
        let mut focus = FocusBuffer::new(2);
        focus.offer(item("a", 0.9)).unwrap();
        focus.offer(item("b", 0.88)).unwrap();
        assert!(focus.offer(item("a", 0.97)).unwrap().is_none());
        assert_eq!(focus.len(), 2);
        assert_eq!(focus.peek_all()[0].id, "a");
    }

    #[test]
    fn test_take_removes_resident() {
        let mut focus = FocusBuffer::new(3);
        focus.offer(item("a", 0.86)).unwrap();
        focus.offer(item("b", 0.9)).unwrap();
        assert_eq!(focus.peek_all()[0].id, "b");
        assert_eq!(focus.take("a").unwrap().priority, 0.86);
        assert!(focus.take("a").is_none());
        assert_eq!(focus.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_an_error() {
        let mut focus = FocusBuffer::new(0);
        assert!(matches!(
            focus.offer(item("a", 0.9)),
            Err(StrataError::CapacityExceeded { .. })
        ));
    }
}
