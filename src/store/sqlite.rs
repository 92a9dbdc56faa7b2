//! SQLite-backed fingerprint store
//!
//! All operations run against an in-memory [`FingerprintMap`]; the database is
//! only read by `load` and rewritten by `store`.

use crate::store::memory::FingerprintMap;
use crate::store::schema::initialize_schema;
use crate::store::traits::{FingerprintStore, StoreResult};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Fingerprint store persisted to a SQLite database file
pub struct SqliteFingerprintStore {
    path: PathBuf,
    map: FingerprintMap,
}

impl SqliteFingerprintStore {
    /// Creates a store backed by the database at `path`
    ///
    /// Nothing is read until [`load`](FingerprintStore::load) is called. The
    /// file and its parent directories are created on the first
    /// [`store`](FingerprintStore::store).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map: FingerprintMap::new(),
        }
    }

    /// Creates a store and loads any persisted state
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// Path of the backing database
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_schema(&conn)?;
        Ok(conn)
    }
}

impl FingerprintStore for SqliteFingerprintStore {
    fn is_known(&self, id: &str) -> bool {
        self.map.is_known(id)
    }

    fn get(&self, id: &str, key: &str) -> Option<&str> {
        self.map.get(id, key)
    }

    fn put(&mut self, id: &str, key: &str, value: &str) -> StoreResult<()> {
        self.map.put(id, key, value)
    }

    fn remove_key(&mut self, id: &str, key: &str) -> StoreResult<()> {
        self.map.remove_key(id, key)
    }

    fn remove(&mut self, id: &str) -> StoreResult<()> {
        self.map.remove(id)
    }

    fn put_referred_id(&mut self, id: &str, referred_id: &str) -> StoreResult<()> {
        self.map.put_referred_id(id, referred_id)
    }

    fn referred_ids(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.map.referred_ids(id)
    }

    fn remove_referred_ids(&mut self, id: &str) -> StoreResult<()> {
        self.map.remove_referred_ids(id)
    }

    fn known_ids(&self) -> BTreeSet<String> {
        self.map.known_ids()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn load(&mut self) -> StoreResult<()> {
        if !self.path.exists() {
            tracing::debug!(
                "No fingerprint database at {}, starting empty",
                self.path.display()
            );
            self.map = FingerprintMap::new();
            return Ok(());
        }

        let conn = self.connect()?;
        let mut map = FingerprintMap::new();

        let mut stmt = conn.prepare("SELECT id, key, value FROM fingerprints")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, key, value) = row?;
            map.put(&id, &key, &value)?;
        }

        let mut stmt = conn.prepare("SELECT id, referred_id FROM referred_ids")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, referred_id) = row?;
            map.put_referred_id(&id, &referred_id)?;
        }

        tracing::debug!(
            "Loaded {} fingerprinted resources from {}",
            map.len(),
            self.path.display()
        );
        self.map = map;
        Ok(())
    }

    fn store(&mut self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM fingerprints", [])?;
        tx.execute("DELETE FROM referred_ids", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO fingerprints (id, key, value) VALUES (?1, ?2, ?3)")?;
            for (id, key, value) in self.map.values() {
                insert.execute(params![id, key, value])?;
            }

            let mut insert =
                tx.prepare("INSERT INTO referred_ids (id, referred_id) VALUES (?1, ?2)")?;
            for (id, referred_id) in self.map.referrals() {
                insert.execute(params![id, referred_id])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            "Stored {} fingerprinted resources to {}",
            self.map.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SqliteFingerprintStore::open(dir.path().join("missing.db")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("fingerprints.db");

        let mut store = SqliteFingerprintStore::new(&path);
        store.put("file:///a", "fingerprint", "1").unwrap();
        store.put("file:///b", "fingerprint", "2").unwrap();
        store.put_referred_id("file:///b", "tar:file:///b!/x").unwrap();
        store.put("tar:file:///b!/x", "content-hash", "abc").unwrap();
        store.store().unwrap();

        let reloaded = SqliteFingerprintStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get("file:///a", "fingerprint"), Some("1"));
        assert_eq!(reloaded.get("tar:file:///b!/x", "content-hash"), Some("abc"));
        assert!(reloaded
            .referred_ids("file:///b")
            .is_some_and(|r| r.contains("tar:file:///b!/x")));
    }

    #[test]
    fn test_store_overwrites_previous_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fingerprints.db");

        let mut store = SqliteFingerprintStore::new(&path);
        store.put("file:///a", "fingerprint", "1").unwrap();
        store.store().unwrap();

        store.remove("file:///a").unwrap();
        store.put("file:///c", "fingerprint", "3").unwrap();
        store.store().unwrap();

        let reloaded = SqliteFingerprintStore::open(&path).unwrap();
        assert!(!reloaded.is_known("file:///a"));
        assert!(reloaded.is_known("file:///c"));
    }

    #[test]
    fn test_load_discards_unsaved_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fingerprints.db");

        let mut store = SqliteFingerprintStore::new(&path);
        store.put("file:///a", "fingerprint", "1").unwrap();
        store.store().unwrap();

        store.put("file:///b", "fingerprint", "2").unwrap();
        store.load().unwrap();

        assert!(store.is_known("file:///a"));
        assert!(!store.is_known("file:///b"));
    }

    #[test]
    fn test_corrupt_file_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fingerprints.db");
        std::fs::write(&path, b"this is not a sqlite database at all").unwrap();

        assert!(SqliteFingerprintStore::open(&path).is_err());
    }
}
