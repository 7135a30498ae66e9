//! Short-window buffer for recently routed items.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::types::{MemoryItem, Tier};

/// Time-indexed holding area with a fixed retention window.
///
/// Expired entries are handed back by [`FreshBuffer::take_expired`]; the
/// caller routes every one of them onward.
#[derive(Debug)]
pub struct FreshBuffer {
    window: Duration,
    expiries: BTreeMap<(DateTime<Utc>, u64), String>,
    entries: HashMap<String, FreshEntry>,
    seq: u64,
}

#[derive(Debug)]
struct FreshEntry {
    item: MemoryItem,
    key: (DateTime<Utc>, u64),
}

impl FreshBuffer {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs as i64),
            expiries: BTreeMap::new(),
            entries: HashMap::new(),
            seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert an item expiring one window after `now`; returns the expiry.
    ///
    /// Re-offering a resident restarts its window.
    pub fn offer(&mut self, mut item: MemoryItem, now: DateTime<Utc>) -> DateTime<Utc> {
        self.take(&item.id);
        item.tier = Tier::Fresh;

        self.seq += 1;
        let expires_at = now + self.window;
        let key = (expires_at, self.seq);
        self.expiries.insert(key, item.id.clone());
        self.entries.insert(item.id.clone(), FreshEntry { item, key });
        expires_at
    }

    /// Remove and return every entry whose expiry is at or before `now`,
    /// earliest first.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<MemoryItem> {
        let mut expired = Vec::new();
        while let Some(next) = self.expiries.first_key_value().map(|(key, _)| key.0) {
            if next > now {
                break;
            }
            if let Some((_, id)) = self.expiries.pop_first() {
                if let Some(entry) = self.entries.remove(&id) {
                    expired.push(entry.item);
                }
            }
        }
        expired
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.entries.get(id).map(|e| &e.item)
    }

    /// Expiry time of a resident.
    pub fn expires_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(id).map(|e| e.key.0)
    }

    /// Remove a resident.
    pub fn take(&mut self, id: &str) -> Option<MemoryItem> {
        let entry = self.entries.remove(id)?;
        self.expiries.remove(&entry.key);
        Some(entry.item)
    }

    /// Residents, highest priority first.
    pub fn peek_all(&self) -> Vec<MemoryItem> {
        let mut items: Vec<MemoryItem> = self.entries.values().map(|e| e.item.clone()).collect();
        items.sort_by(|a, b| b.priority.total_cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, now: DateTime<Utc>) -> MemoryItem {
        MemoryItem::new(id, id, "agent-a", now, now)
    }

    #[test]
    fn test_offer_sets_absolute_expiry() {
        let now = Utc::now();
        let mut fresh = FreshBuffer::new(600);
        let expires = fresh.offer(item("a", now), now);
        assert_eq!(expires, now + Duration::seconds(600));
        assert_eq!(fresh.expires_at("a"), Some(expires));
        assert_eq!(fresh.get("a").unwrap().tier, Tier::Fresh);
    }

    #[test]
    fn test_take_expired_in_expiry_order() {
        let t0 = Utc::now();
        let mut fresh = FreshBuffer::new(60);
        fresh.offer(item("a", t0), t0);
        fresh.offer(item("b", t0), t0 + Duration::seconds(10));
        fresh.offer(item("c", t0), t0 + Duration::seconds(100));

        assert!(fresh.take_expired(t0 + Duration::seconds(59)).is_empty());

        let expired = fresh.take_expired(t0 + Duration::seconds(70));
        let ids: Vec<&str> = expired.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(fresh.len(), 1);
        assert!(fresh.contains("c"));
    }

    #[test]
    fn test_reoffer_restarts_window() {
        let t0 = Utc::now();
        let mut fresh = FreshBuffer::new(60);
        fresh.offer(item("a", t0), t0);
        fresh.offer(item("a", t0), t0 + Duration::seconds(30));
        assert_eq!(fresh.len(), 1);
        assert!(fresh.take_expired(t0 + Duration::seconds(61)).is_empty());
        assert_eq!(fresh.take_expired(t0 + Duration::seconds(90)).len(), 1);
    }

    #[test]
    fn test_take_removes_entry_and_expiry() {
        let t0 = Utc::now();
        let mut fresh = FreshBuffer::new(60);
        fresh.offer(item("a", t0), t0);
        assert!(fresh.take("a").is_some());
        assert!(fresh.take_expired(t0 + Duration::seconds(120)).is_empty());
        assert!(fresh.is_empty());
    }
}
