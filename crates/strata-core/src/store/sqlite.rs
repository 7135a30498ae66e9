//! SQLite-backed persistence for the long_term and archival tiers.
//!
//! Compare-and-set is expressed as `UPDATE ... WHERE id = ? AND version = ?`;
//! zero affected rows means another writer got there first.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::similarity;
use crate::error::{StrataError, StrataResult};
use crate::traits::{MemoryStore, SimilarItem, TierSummary};
use crate::types::{MemoryItem, SignalVector, Tier};

const COLUMNS: &str = "id, content, event_time, created_at, tier, strength, anchor_strength, \
     reinforcement_count, last_reinforced_at, signals, priority, source_agent_id, version";

/// SQLite store for persisted memory items.
pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    /// Open (or create) a store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> StrataResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> StrataResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StrataResult<()> {
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS memory_items (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                event_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                tier TEXT NOT NULL,
                strength REAL NOT NULL,
                anchor_strength REAL NOT NULL,
                reinforcement_count INTEGER NOT NULL DEFAULT 0,
                last_reinforced_at TEXT NOT NULL,
                signals TEXT NOT NULL,
                priority REAL NOT NULL,
                source_agent_id TEXT NOT NULL,
                version INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memory_items_tier ON memory_items(tier);
            CREATE INDEX IF NOT EXISTS idx_memory_items_strength ON memory_items(strength);
            ",
        )?;

        Ok(())
    }

    fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
        let signals_json: String = row.get(9)?;
        let version: i64 = row.get(12)?;

        Ok(MemoryItem {
            id: row.get(0)?,
            content: row.get(1)?,
            event_time: time_column(row, 2)?,
            created_at: time_column(row, 3)?,
            tier: tier_column(row, 4)?,
            strength: row.get(5)?,
            anchor_strength: row.get(6)?,
            reinforcement_count: row.get(7)?,
            last_reinforced_at: time_column(row, 8)?,
            signals: serde_json::from_str::<SignalVector>(&signals_json)
                .map_err(|e| conversion_failure(9, Type::Text, e))?,
            priority: row.get(10)?,
            source_agent_id: row.get(11)?,
            version: u64::try_from(version).map_err(|e| conversion_failure(12, Type::Integer, e))?,
        })
    }
}

fn tier_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Tier> {
    let raw: String = row.get(idx)?;
    Tier::from_str(&raw).map_err(|e| conversion_failure(idx, Type::Text, e))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, Type::Text, e))
}

fn conversion_failure<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get(&self, id: &str) -> StrataResult<Option<MemoryItem>> {
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;
        let item = conn
            .query_row(
                &format!("SELECT {} FROM memory_items WHERE id = ?1", COLUMNS),
                params![id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    async fn upsert(&self, mut item: MemoryItem, expected_version: Option<u64>) -> StrataResult<MemoryItem> {
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;
        let signals = serde_json::to_string(&item.signals)?;

        let current: Option<i64> = conn
            .query_row(
                "SELECT version FROM memory_items WHERE id = ?1",
                params![item.id],
                |row| row.get(0),
            )
            .optional()?;

        match expected_version {
            None => {
                if let Some(actual) = current {
                    return Err(StrataError::conflict(&item.id, 0, Some(actual as u64)));
                }
                item.version = 1;
                conn.execute(
                    &format!(
                        "INSERT INTO memory_items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        COLUMNS
                    ),
                    params![
                        item.id,
                        item.content,
                        item.event_time.to_rfc3339(),
                        item.created_at.to_rfc3339(),
                        item.tier.to_string(),
                        item.strength,
                        item.anchor_strength,
                        item.reinforcement_count,
                        item.last_reinforced_at.to_rfc3339(),
                        signals,
                        item.priority,
                        item.source_agent_id,
                        item.version as i64,
                    ],
                )?;
            }
            Some(expected) => {
                let changed = conn.execute(
                    "UPDATE memory_items SET
                        content = ?2, event_time = ?3, tier = ?4, strength = ?5, anchor_strength = ?6,
                        reinforcement_count = ?7, last_reinforced_at = ?8, signals = ?9, priority = ?10,
                        version = version + 1
                     WHERE id = ?1 AND version = ?11",
                    params![
                        item.id,
                        item.content,
                        item.event_time.to_rfc3339(),
                        item.tier.to_string(),
                        item.strength,
                        item.anchor_strength,
                        item.reinforcement_count,
                        item.last_reinforced_at.to_rfc3339(),
                        signals,
                        item.priority,
                        expected as i64,
                    ],
                )?;
                if changed == 0 {
                    return Err(StrataError::conflict(&item.id, expected, current.map(|v| v as u64)));
                }
                item.version = expected + 1;
            }
        }

        Ok(item)
    }

    async fn remove(&self, id: &str, expected_version: u64) -> StrataResult<bool> {
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;
        let changed = conn.execute(
            "DELETE FROM memory_items WHERE id = ?1 AND version = ?2",
            params![id, expected_version as i64],
        )?;
        if changed > 0 {
            return Ok(true);
        }

        let current: Option<i64> = conn
            .query_row("SELECT version FROM memory_items WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        match current {
            None => Ok(false),
            Some(actual) => Err(StrataError::conflict(id, expected_version, Some(actual as u64))),
        }
    }

    async fn scan_tier(&self, tier: Tier, limit: Option<usize>) -> StrataResult<Vec<MemoryItem>> {
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memory_items WHERE tier = ?1 ORDER BY id LIMIT ?2",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![tier.to_string(), limit], Self::row_to_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    async fn find_similar(&self, content: &str, limit: usize) -> StrataResult<Vec<SimilarItem>> {
        let probe = similarity::tokens(content);
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT id, content, tier FROM memory_items")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                tier_column(row, 2)?,
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, text, tier) = row?;
            let score = similarity::jaccard(&probe, &similarity::tokens(&text));
            if score > 0.0 {
                scored.push(SimilarItem {
                    id,
                    score,
                    tier,
                });
            }
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn tier_summary(&self) -> StrataResult<TierSummary> {
        let conn = self.conn.lock().map_err(|e| StrataError::database(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT tier, COUNT(*), AVG(strength) FROM memory_items GROUP BY tier")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                tier_column(row, 0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut counts = HashMap::new();
        let mut avg_strength = HashMap::new();
        for row in rows {
            let (tier, count, avg) = row?;
            counts.insert(tier, count.max(0) as usize);
            avg_strength.insert(tier, avg as f32);
        }
        Ok(TierSummary { counts, avg_strength })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signal;

    fn item(id: &str, content: &str, tier: Tier) -> MemoryItem {
        let now = Utc::now();
        let mut i = MemoryItem::new(id, content, "agent-a", now, now);
        i.tier = tier;
        i.signals = SignalVector::zero().with(Signal::Intensity, 0.8);
        i
    }

    #[tokio::test]
    async fn test_round_trip_and_cas() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let stored = store.upsert(item("m1", "met Anna for coffee", Tier::LongTerm), None).await.unwrap();
        assert_eq!(stored.version, 1);

        let loaded = store.get("m1").await.unwrap().unwrap();
        assert_eq!(loaded.content, "met Anna for coffee");
        assert_eq!(loaded.tier, Tier::LongTerm);
        assert!((loaded.signals.intensity - 0.8).abs() < 1e-6);

        let mut next = loaded.clone();
        next.strength = 0.3;
        next.tier = Tier::Archival;
        let updated = store.upsert(next.clone(), Some(1)).await.unwrap();
        assert_eq!(updated.version, 2);

        // Writing with the stale version fails and leaves the row untouched.
        let err = store.upsert(next, Some(1)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.get("m1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        {
            let store = SqliteMemoryStore::new(&path).unwrap();
            store.upsert(item("m1", "persist me", Tier::Archival), None).await.unwrap();
        }
        let reopened = SqliteMemoryStore::new(&path).unwrap();
        let scanned = reopened.scan_tier(Tier::Archival, Some(10)).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, "m1");
    }

    #[tokio::test]
    async fn test_corrupt_rows_are_reported() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.upsert(item("bad-tier", "one", Tier::LongTerm), None).await.unwrap();
        store.upsert(item("bad-time", "two", Tier::LongTerm), None).await.unwrap();
        store.upsert(item("bad-signals", "three", Tier::LongTerm), None).await.unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE memory_items SET tier = 'limbo' WHERE id = 'bad-tier'", [])
                .unwrap();
            conn.execute(
                "UPDATE memory_items SET last_reinforced_at = 'yesterday' WHERE id = 'bad-time'",
                [],
            )
            .unwrap();
            conn.execute("UPDATE memory_items SET signals = '{oops' WHERE id = 'bad-signals'", [])
                .unwrap();
        }

        for id in ["bad-tier", "bad-time", "bad-signals"] {
            let err = store.get(id).await.unwrap_err();
            assert!(matches!(err, StrataError::Database { .. }), "{id}: {err}");
        }
        assert!(store.scan_tier(Tier::LongTerm, None).await.is_err());
        assert!(store.find_similar("one", 5).await.is_err());
        assert!(store.tier_summary().await.is_err());
    }

    #[tokio::test]
    async fn test_remove_and_summary() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let a = store.upsert(item("a", "one", Tier::LongTerm), None).await.unwrap();
        store.upsert(item("b", "two", Tier::LongTerm), None).await.unwrap();

        let summary = store.tier_summary().await.unwrap();
        assert_eq!(summary.counts.get(&Tier::LongTerm), Some(&2));

        assert!(store.remove("a", a.version + 5).await.is_err());
        assert!(store.remove("a", a.version).await.unwrap());
        assert!(!store.remove("a", a.version).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_similar() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.upsert(item("a", "morning run by the river", Tier::LongTerm), None).await.unwrap();
        store.upsert(item("b", "quarterly budget review", Tier::LongTerm), None).await.unwrap();
        let similar = store.find_similar("evening run by the river", 5).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].id, "a");
    }
}
