// ABOUTME: Inclusion cache keyed by source reference string, backed by SQLite or memory.
//! Inclusion cache: keyed by the raw reference string, so repeated
//! `@include` of the same path/URL within a run (or across runs, for the
//! SQLite-backed store) skips the reader entirely.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::error::CacheError;

pub trait Cache {
    fn get(&self, reference: &str) -> Result<Option<String>, CacheError>;
    fn put(&self, reference: &str, content: &str) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: RefCell<HashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache::default()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, reference: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.borrow().get(reference).cloned())
    }

    fn put(&self, reference: &str, content: &str) -> Result<(), CacheError> {
        self.entries.borrow_mut().insert(reference.to_string(), content.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

pub struct SqliteCache {
    conn: Connection,
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS inclusions (
    reference TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
)";

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(|e| CacheError::Storage(e.to_string()))?;
        conn.execute(CREATE_TABLE, []).map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(SqliteCache { conn })
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Storage(e.to_string()))?;
        conn.execute(CREATE_TABLE, []).map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(SqliteCache { conn })
    }
}

impl Cache for SqliteCache {
    fn get(&self, reference: &str) -> Result<Option<String>, CacheError> {
        let mut stmt = self
            .conn
            .prepare("SELECT content FROM inclusions WHERE reference = ?1")
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        let mut rows = stmt
            .query(rusqlite::params![reference])
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        match rows.next().map_err(|e| CacheError::Storage(e.to_string()))? {
            Some(row) => Ok(Some(row.get(0).map_err(|e| CacheError::Storage(e.to_string()))?)),
            None => Ok(None),
        }
    }

    fn put(&self, reference: &str, content: &str) -> Result<(), CacheError> {
        let fetched_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.conn
            .execute(
                "INSERT INTO inclusions (reference, content, fetched_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(reference) DO UPDATE SET content = excluded.content, fetched_at = excluded.fetched_at",
                rusqlite::params![reference, content, fetched_at],
            )
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM inclusions", [])
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_cache_round_trips() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("a").unwrap(), None);
        cache.put("a", "content").unwrap();
        assert_eq!(cache.get("a").unwrap(), Some("content".to_string()));
        cache.clear().unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn sqlite_cache_round_trips_and_overwrites() {
        let cache = SqliteCache::open_in_memory().unwrap();
        cache.put("a", "one").unwrap();
        assert_eq!(cache.get("a").unwrap(), Some("one".to_string()));
        cache.put("a", "two").unwrap();
        assert_eq!(cache.get("a").unwrap(), Some("two".to_string()));
    }
}
