//! Canonical chunk store.
//!
//! The durable source of truth for every owner's chunk records. Index
//! artifacts are derived from it and rebuilt from it; nothing in this
//! crate ever rolls a canonical mutation back to keep an index consistent.

use crate::types::ChunkRecord;
use chrono::{DateTime, Utc};
use ragstore_core::{AppError, AppResult};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Record store queried by owner and by `(owner, file)`.
///
/// Calls are blocking; implementations must be safe to share across tasks.
pub trait ChunkStore: Send + Sync {
    /// Insert records; returns the number inserted.
    fn insert_many(&self, records: &[ChunkRecord]) -> AppResult<usize>;

    /// All records for an owner, in insertion order.
    fn find_by_owner(&self, owner_id: &str) -> AppResult<Vec<ChunkRecord>>;

    /// Records of a single file for an owner, in insertion order.
    fn find_by_file(&self, owner_id: &str, file_id: &str) -> AppResult<Vec<ChunkRecord>>;

    fn count_by_owner(&self, owner_id: &str) -> AppResult<usize>;

    /// Delete every record of a file; returns the number deleted.
    fn delete_by_file(&self, owner_id: &str, file_id: &str) -> AppResult<usize>;

    /// Distinct owners with at least one record.
    fn list_owners(&self) -> AppResult<Vec<String>>;
}

/// SQLite-backed chunk store.
pub struct SqliteChunkStore {
    conn: Mutex<Connection>,
}

impl SqliteChunkStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::ChunkStore(format!("Failed to create chunk store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::ChunkStore(format!("Failed to open chunk store: {}", e)))?;

        Self::init(conn)
    }

    /// In-memory store, mainly for tests and throwaway tooling.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::ChunkStore(format!("Failed to open chunk store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_owner_file
                ON chunks(owner_id, file_id, chunk_index);
            "#,
        )
        .map_err(|e| AppError::ChunkStore(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Initialized chunk store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::ChunkStore("Chunk store connection poisoned".to_string()))
    }

    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> AppResult<Vec<ChunkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::ChunkStore(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params, row_to_record)
            .map_err(|e| AppError::ChunkStore(format!("Failed to query chunks: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::ChunkStore(format!("Failed to read chunk row: {}", e)))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChunkRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        owner_id: row.get(2)?,
        chunk_index: row.get::<_, i64>(3)? as u32,
        text: row.get(4)?,
        created_at,
    })
}

impl ChunkStore for SqliteChunkStore {
    fn insert_many(&self, records: &[ChunkRecord]) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::ChunkStore(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (id, file_id, owner_id, chunk_index, text, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| AppError::ChunkStore(format!("Failed to prepare insert: {}", e)))?;

            for record in records {
                stmt.execute(params![
                    record.id,
                    record.file_id,
                    record.owner_id,
                    record.chunk_index as i64,
                    record.text,
                    record.created_at.to_rfc3339(),
                ])
                .map_err(|e| AppError::ChunkStore(format!("Failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::ChunkStore(format!("Failed to commit chunks: {}", e)))?;

        tracing::debug!("Inserted {} chunk records", records.len());
        Ok(records.len())
    }

    fn find_by_owner(&self, owner_id: &str) -> AppResult<Vec<ChunkRecord>> {
        self.query_records(
            "SELECT id, file_id, owner_id, chunk_index, text, created_at
             FROM chunks WHERE owner_id = ?1 ORDER BY rowid",
            &[&owner_id],
        )
    }

    fn find_by_file(&self, owner_id: &str, file_id: &str) -> AppResult<Vec<ChunkRecord>> {
        self.query_records(
            "SELECT id, file_id, owner_id, chunk_index, text, created_at
             FROM chunks WHERE owner_id = ?1 AND file_id = ?2 ORDER BY rowid",
            &[&owner_id, &file_id],
        )
    }

    fn count_by_owner(&self, owner_id: &str) -> AppResult<usize> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(|e| AppError::ChunkStore(format!("Failed to count chunks: {}", e)))
    }

    fn delete_by_file(&self, owner_id: &str, file_id: &str) -> AppResult<usize> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM chunks WHERE owner_id = ?1 AND file_id = ?2",
                params![owner_id, file_id],
            )
            .map_err(|e| AppError::ChunkStore(format!("Failed to delete chunks: {}", e)))?;

        tracing::info!(
            "Deleted {} chunk records of file '{}' for owner '{}'",
            deleted,
            file_id,
            owner_id
        );
        Ok(deleted)
    }

    fn list_owners(&self) -> AppResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT owner_id FROM chunks ORDER BY owner_id")
            .map_err(|e| AppError::ChunkStore(format!("Failed to prepare query: {}", e)))?;

        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AppError::ChunkStore(format!("Failed to list owners: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::ChunkStore(format!("Failed to read owner row: {}", e)))?;

        Ok(owners)
    }
}
