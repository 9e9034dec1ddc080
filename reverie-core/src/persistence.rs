//! SQLite persistence for memory indexes and the relationship graph.
//!
//! Each character's memory records are serialized to JSON and stored as
//! one row; each relationship pair likewise. The schema stays stable
//! across record-shape changes:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memory_indexes (
//!     character_id TEXT PRIMARY KEY,
//!     data         BLOB NOT NULL,
//!     updated_at   TEXT NOT NULL,
//!     checksum     TEXT
//! );
//! CREATE TABLE IF NOT EXISTS relationships (
//!     pair_key   TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! WAL mode keeps concurrent reads cheap, and an optional CRC-32 checksum
//! detects save corruption. A corrupt or unparseable row is skipped with
//! a warning on bulk load; one bad save must not take the whole world
//! down with it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{EngineError, Result};
use crate::memory::MemoryRecord;
use crate::social::{PairKey, Relationship};
use crate::types::CharacterId;

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memory_indexes (
    character_id TEXT PRIMARY KEY,
    data         BLOB NOT NULL,
    updated_at   TEXT NOT NULL,
    checksum     TEXT
);
CREATE TABLE IF NOT EXISTS relationships (
    pair_key   TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to the open SQLite database.
///
/// The connection is guarded by a mutex so the engine can be shared
/// across tasks; every operation is a short transaction, so contention
/// stays negligible next to the I/O itself.
pub struct PersistenceEngine {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) the database at `path`, creating the schema if it
    /// does not exist.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Persistence engine opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (tests and throwaway worlds).
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ------------------------------------------------------------------
    // Memory indexes
    // ------------------------------------------------------------------

    /// Save (upsert) a character's memory records.
    ///
    /// # Errors
    /// Returns [`EngineError::Serialization`] if JSON encoding fails, or
    /// [`EngineError::Database`] on SQLite failures.
    pub fn save_index(&self, character: &CharacterId, records: &[MemoryRecord]) -> Result<()> {
        let start = Instant::now();
        let json =
            serde_json::to_vec(records).map_err(|e| EngineError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memory_indexes (character_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(character_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![character.as_str(), json, now, checksum],
        )?;

        debug!(
            character = %character,
            memories = records.len(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved memory index"
        );
        Ok(())
    }

    /// Load a character's memory records. Returns `None` if the character
    /// has never been saved. A checksum mismatch is logged but the data
    /// is still decoded; outright parse failures propagate.
    ///
    /// # Errors
    /// Returns [`EngineError::Serialization`] if JSON decoding fails, or
    /// [`EngineError::Database`] on SQLite failures.
    pub fn load_index(&self, character: &CharacterId) -> Result<Option<Vec<MemoryRecord>>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data, checksum FROM memory_indexes WHERE character_id = ?1")?;

        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![character.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };
        self.verify_checksum(character.as_str(), &data, stored_checksum.as_deref());

        let records: Vec<MemoryRecord> = serde_json::from_slice(&data)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(Some(records))
    }

    /// Load every saved memory index, skipping rows that fail checksum
    /// verification or JSON decoding.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn load_all_indexes(&self) -> Result<Vec<(CharacterId, Vec<MemoryRecord>)>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT character_id, data, checksum FROM memory_indexes")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, data, stored_checksum) = row?;
            if !self.verify_checksum(&id, &data, stored_checksum.as_deref()) {
                warn!(character = %id, "Skipping corrupt memory index row");
                continue;
            }
            match serde_json::from_slice::<Vec<MemoryRecord>>(&data) {
                Ok(records) => out.push((CharacterId::from(id.as_str()), records)),
                Err(e) => {
                    warn!(character = %id, error = %e, "Skipping unparseable memory index row");
                }
            }
        }
        Ok(out)
    }

    /// Delete a character's saved index. Returns `true` if a row existed.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn delete_index(&self, character: &CharacterId) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM memory_indexes WHERE character_id = ?1",
            params![character.as_str()],
        )?;
        Ok(deleted > 0)
    }

    /// Number of characters with a saved index.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn character_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_indexes", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Save (upsert) a snapshot of the relationship graph, one row per
    /// pair.
    ///
    /// # Errors
    /// Returns [`EngineError::Serialization`] if JSON encoding fails, or
    /// [`EngineError::Database`] on SQLite failures.
    pub fn save_relationships(&self, relationships: &[Relationship]) -> Result<()> {
        let start = Instant::now();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for rel in relationships {
            let key = PairKey::new(&rel.a, &rel.b).to_string();
            let json =
                serde_json::to_vec(rel).map_err(|e| EngineError::Serialization(e.to_string()))?;
            let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
            tx.execute(
                "INSERT INTO relationships (pair_key, data, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(pair_key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at,
                    checksum = excluded.checksum",
                params![key, json, now, checksum],
            )?;
        }
        tx.commit()?;

        debug!(
            pairs = relationships.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved relationship graph"
        );
        Ok(())
    }

    /// Load every saved relationship, skipping corrupt rows.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] on SQLite failures.
    pub fn load_relationships(&self) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT pair_key, data, checksum FROM relationships")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, data, stored_checksum) = row?;
            if !self.verify_checksum(&key, &data, stored_checksum.as_deref()) {
                warn!(pair = %key, "Skipping corrupt relationship row");
                continue;
            }
            match serde_json::from_slice::<Relationship>(&data) {
                Ok(rel) => out.push(rel),
                Err(e) => {
                    warn!(pair = %key, error = %e, "Skipping unparseable relationship row");
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Run SQLite's integrity check. `Ok(false)` means corruption was
    /// detected.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Returns whether the data matches its stored checksum. Always true
    /// when checksums are disabled or the row has none.
    fn verify_checksum(&self, key: &str, data: &[u8], stored: Option<&str>) -> bool {
        if !self.config.checksum_enabled {
            return true;
        }
        let Some(expected) = stored else {
            return true;
        };
        let actual = crc32_hex(data);
        if expected == actual {
            true
        } else {
            warn!(
                key = %key,
                expected = %expected,
                actual = %actual,
                "Checksum mismatch — possible save corruption"
            );
            false
        }
    }
}

/// Extension trait that adds an `.optional()` combinator to
/// `rusqlite::Result`, converting `Err(QueryReturnedNoRows)` into
/// `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::RelationType;
    use crate::types::{MemoryCategory, Timestamp};
    use std::collections::VecDeque;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample_records() -> Vec<MemoryRecord> {
        let now = Timestamp::now();
        vec![
            MemoryRecord::new(
                "Met a wandering bard at the tavern",
                None,
                7.0,
                MemoryCategory::Conversation,
                now,
            ),
            MemoryRecord::new(
                "Walked to the market square",
                None,
                2.0,
                MemoryCategory::Movement,
                now,
            ),
        ]
    }

    fn sample_relationship(a: &str, b: &str) -> Relationship {
        Relationship {
            a: CharacterId::from(a),
            b: CharacterId::from(b),
            relation_type: RelationType::Friend,
            strength: 0.5,
            notes: "Met at the harvest festival.".to_string(),
            last_interaction: Timestamp::now(),
            interaction_count: 4,
            shared_memories: VecDeque::from(["talked about the weather".to_string()]),
            sentiment_history: VecDeque::from([0.3, 0.5]),
            version: 4,
        }
    }

    #[test]
    fn round_trip_save_load_index() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let ada = CharacterId::from("ada");
        let records = sample_records();

        engine.save_index(&ada, &records).expect("save");
        let loaded = engine.load_index(&ada).expect("load").expect("Some");

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].text, records[0].text);
        assert!((loaded[0].importance - 7.0).abs() < 1e-6);
        assert_eq!(loaded[1].category, MemoryCategory::Movement);
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let result = engine.load_index(&CharacterId::from("ghost")).expect("load");
        assert!(result.is_none());
    }

    #[test]
    fn upsert_overwrites() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let ada = CharacterId::from("ada");

        engine.save_index(&ada, &sample_records()).expect("save1");
        let mut more = sample_records();
        more.extend(sample_records());
        engine.save_index(&ada, &more).expect("save2");

        let loaded = engine.load_index(&ada).expect("load").expect("Some");
        assert_eq!(loaded.len(), 4, "should reflect the second save");
    }

    #[test]
    fn delete_index_works() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let ada = CharacterId::from("ada");

        engine.save_index(&ada, &sample_records()).expect("save");
        assert!(engine.delete_index(&ada).expect("delete"));
        assert!(!engine.delete_index(&ada).expect("delete again"));
        assert!(engine.load_index(&ada).expect("load").is_none());
    }

    #[test]
    fn load_all_skips_corrupt_rows() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        engine.save_index(&CharacterId::from("ada"), &sample_records()).expect("save");
        engine.save_index(&CharacterId::from("bix"), &sample_records()).expect("save");

        // Corrupt one row's payload without updating its checksum.
        {
            let conn = engine.conn.lock();
            conn.execute(
                "UPDATE memory_indexes SET data = X'DEADBEEF' WHERE character_id = 'bix'",
                [],
            )
            .expect("corrupt");
        }

        let all = engine.load_all_indexes().expect("load all");
        assert_eq!(all.len(), 1, "the corrupt row must be skipped, not fatal");
        assert_eq!(all[0].0, CharacterId::from("ada"));
        assert_eq!(engine.character_count().expect("count"), 2);
    }

    #[test]
    fn relationship_round_trip() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let rels = vec![sample_relationship("ada", "bix"), sample_relationship("bix", "cyr")];

        engine.save_relationships(&rels).expect("save");
        let mut loaded = engine.load_relationships().expect("load");
        loaded.sort_by(|x, y| (x.a.clone(), x.b.clone()).cmp(&(y.a.clone(), y.b.clone())));

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].a, CharacterId::from("ada"));
        assert_eq!(loaded[0].interaction_count, 4);
        assert_eq!(loaded[0].shared_memories.len(), 1);
        assert_eq!(loaded[0].relation_type, RelationType::Friend);
    }

    #[test]
    fn relationship_rows_are_keyed_canonically() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");

        // Same pair saved twice with members swapped: one row.
        let mut rel = sample_relationship("ada", "bix");
        engine.save_relationships(std::slice::from_ref(&rel)).expect("save1");
        std::mem::swap(&mut rel.a, &mut rel.b);
        rel.version = 9;
        engine.save_relationships(&[rel]).expect("save2");

        let loaded = engine.load_relationships().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].version, 9);
    }

    #[test]
    fn file_based_open_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("world.db");
        let config = test_config();

        {
            let engine = PersistenceEngine::open(&db_path, &config).expect("open");
            engine.save_index(&CharacterId::from("ada"), &sample_records()).expect("save");
        }

        let engine = PersistenceEngine::open(&db_path, &config).expect("reopen");
        let loaded = engine.load_index(&CharacterId::from("ada")).expect("load").expect("Some");
        assert_eq!(loaded.len(), 2);
        assert!(engine.integrity_check().expect("check"));
    }

    #[test]
    fn crc32_basic() {
        // Known test vector: CRC-32 of "123456789" = 0xCBF43926
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
