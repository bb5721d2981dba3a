// Learning store
//
// Durable record of synthesized answers that cleared the confidence gate.
// - SQLite with WAL mode; one connection behind a mutex (single writer)
// - Appends are single INSERTs, batch consumption is one IMMEDIATE transaction
// - Append-only: triggers forbid deletes and consumed 1 -> 0

mod types;

pub use types::{LearningRecord, RecentEntry, RetrainingStats, StoreStats};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::constants::{HIGH_CONFIDENCE_MARK, RECENT_ENTRIES_LIMIT};
use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::synthesis::SynthesizedAnswer;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str =
    "id, query, answer, confidence, sources_used, reasoning, created_at, consumed";

pub struct LearningStore {
    db: Arc<Mutex<Connection>>,
    store_threshold: f64,
    location: Option<PathBuf>,
}

impl LearningStore {
    /// Open (or create) the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open_at(&config.db_path, config.store_threshold)
    }

    pub fn open_at(path: &Path, store_threshold: f64) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // WAL lets readers proceed while a writer holds the lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(StoreError::Write)?;

        let store = Self::init(conn, store_threshold, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "Learning store initialized");
        Ok(store)
    }

    /// Non-durable store, mainly for tests and dry runs
    pub fn in_memory(store_threshold: f64) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::init(conn, store_threshold, None)
    }

    fn init(
        conn: Connection,
        store_threshold: f64,
        location: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(StoreError::Write)?;
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(StoreError::Write)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            store_threshold,
            location,
        })
    }

    pub fn store_threshold(&self) -> f64 {
        self.store_threshold
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Persist `answer` if it clears the confidence gate.
    ///
    /// Returns `None` (and writes nothing) for sub-threshold answers.
    pub async fn append(
        &self,
        answer: &SynthesizedAnswer,
    ) -> Result<Option<LearningRecord>, StoreError> {
        if !(answer.confidence >= self.store_threshold) {
            tracing::debug!(
                confidence = answer.confidence,
                threshold = self.store_threshold,
                "Below store threshold, not storing"
            );
            return Ok(None);
        }

        let created_at = Utc::now();
        let sources_json = serde_json::to_string(&answer.sources_used).map_err(|e| {
            StoreError::Corrupt {
                id: 0,
                message: e.to_string(),
            }
        })?;

        let id = {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO learning_records
                     (query, answer, confidence, sources_used, reasoning, created_at, consumed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    answer.query,
                    answer.final_text,
                    answer.confidence,
                    sources_json,
                    answer.reasoning,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(StoreError::Write)?;
            conn.last_insert_rowid()
        };

        tracing::debug!(id, confidence = answer.confidence, "Stored answer for training");

        Ok(Some(LearningRecord {
            id,
            query: answer.query.clone(),
            answer: answer.final_text.clone(),
            confidence: answer.confidence,
            sources_used: answer.sources_used.clone(),
            reasoning: answer.reasoning.clone(),
            created_at,
            consumed: false,
        }))
    }

    /// Unconsumed records with `confidence >= min_confidence`, oldest first
    pub async fn unconsumed(&self, min_confidence: f64) -> Result<Vec<LearningRecord>, StoreError> {
        let conn = self.db.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM learning_records
                 WHERE consumed = 0 AND confidence >= ?1
                 ORDER BY id ASC",
                RECORD_COLUMNS
            ))
            .map_err(StoreError::Read)?;

        let records = stmt
            .query_map([min_confidence], record_from_row)
            .map_err(StoreError::Read)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)?;

        Ok(records)
    }

    /// Flip `consumed` for every id in one transaction.
    ///
    /// All-or-nothing: an unknown id aborts the whole batch. Ids that are
    /// already consumed are left alone, so repeating a call is a no-op.
    /// Returns how many records were newly marked.
    pub async fn mark_consumed(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let ids: BTreeSet<i64> = ids.iter().copied().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::Write)?;

        let mut unknown = Vec::new();
        {
            let mut exists = tx
                .prepare("SELECT 1 FROM learning_records WHERE id = ?1")
                .map_err(StoreError::Read)?;
            for id in &ids {
                if !exists.exists([id]).map_err(StoreError::Read)? {
                    unknown.push(*id);
                }
            }
        }
        if !unknown.is_empty() {
            // Dropping the transaction rolls it back
            return Err(StoreError::UnknownIds(unknown));
        }

        let consumed_at = Utc::now().to_rfc3339();
        let mut flipped = 0;
        {
            let mut update = tx
                .prepare(
                    "UPDATE learning_records SET consumed = 1, consumed_at = ?2
                     WHERE id = ?1 AND consumed = 0",
                )
                .map_err(StoreError::Write)?;
            for id in &ids {
                flipped += update
                    .execute(params![id, consumed_at])
                    .map_err(StoreError::Write)?;
            }
        }

        tx.commit().map_err(StoreError::Write)?;

        tracing::info!(requested = ids.len(), newly_consumed = flipped, "Marked records consumed");

        Ok(flipped)
    }

    /// Consume exactly `ids`, or nothing.
    ///
    /// Unlike `mark_consumed`, an id that is already consumed aborts the whole
    /// batch with `AlreadyConsumed`. A batch built from an `unconsumed`
    /// snapshot can therefore never overlap one claimed in the meantime.
    pub async fn claim(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let ids: BTreeSet<i64> = ids.iter().copied().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::Write)?;

        let mut unknown = Vec::new();
        let mut taken = Vec::new();
        {
            let mut state = tx
                .prepare("SELECT consumed FROM learning_records WHERE id = ?1")
                .map_err(StoreError::Read)?;
            for id in &ids {
                let consumed: Option<i64> = state
                    .query_row([id], |row| row.get(0))
                    .optional()
                    .map_err(StoreError::Read)?;
                match consumed {
                    None => unknown.push(*id),
                    Some(0) => {}
                    Some(_) => taken.push(*id),
                }
            }
        }
        if !unknown.is_empty() {
            return Err(StoreError::UnknownIds(unknown));
        }
        if !taken.is_empty() {
            return Err(StoreError::AlreadyConsumed(taken));
        }

        let consumed_at = Utc::now().to_rfc3339();
        {
            let mut update = tx
                .prepare("UPDATE learning_records SET consumed = 1, consumed_at = ?2 WHERE id = ?1")
                .map_err(StoreError::Write)?;
            for id in &ids {
                update
                    .execute(params![id, consumed_at])
                    .map_err(StoreError::Write)?;
            }
        }

        tx.commit().map_err(StoreError::Write)?;

        tracing::info!(claimed = ids.len(), "Claimed records for training");

        Ok(ids.len())
    }

    pub async fn get(&self, id: i64) -> Result<Option<LearningRecord>, StoreError> {
        let conn = self.db.lock().await;
        conn.query_row(
            &format!("SELECT {} FROM learning_records WHERE id = ?1", RECORD_COLUMNS),
            [id],
            record_from_row,
        )
        .optional()
        .map_err(StoreError::Read)
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let conn = self.db.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM learning_records", [], |row| row.get(0))
            .map_err(StoreError::Read)?;
        Ok(count as usize)
    }

    /// Counts, average confidence and recent entries
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.db.lock().await;

        let (total, unconsumed, high_confidence, average): (i64, i64, i64, Option<f64>) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(consumed = 0), 0),
                        COALESCE(SUM(confidence >= ?1), 0),
                        AVG(confidence)
                 FROM learning_records",
                [HIGH_CONFIDENCE_MARK],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(StoreError::Read)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, query, confidence, created_at FROM learning_records
                 ORDER BY id DESC LIMIT ?1",
            )
            .map_err(StoreError::Read)?;
        let recent = stmt
            .query_map([RECENT_ENTRIES_LIMIT as i64], |row| {
                Ok(RecentEntry {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    confidence: row.get(2)?,
                    created_at: parse_timestamp(row, 3)?,
                })
            })
            .map_err(StoreError::Read)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)?;

        Ok(StoreStats {
            total: total as usize,
            unconsumed: unconsumed as usize,
            consumed: (total - unconsumed) as usize,
            high_confidence: high_confidence as usize,
            average_confidence: round2(average.unwrap_or(0.0)),
            recent,
        })
    }

    /// Status check used before deciding whether to retrain
    pub async fn retraining_stats(
        &self,
        min_confidence: f64,
        min_batch_size: usize,
    ) -> Result<RetrainingStats, StoreError> {
        let conn = self.db.lock().await;
        let (total, new, average, qualifying): (i64, i64, Option<f64>, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(consumed = 0), 0),
                        AVG(CASE WHEN consumed = 0 THEN confidence END),
                        COALESCE(SUM(consumed = 0 AND confidence >= ?1), 0)
                 FROM learning_records",
                [min_confidence],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(StoreError::Read)?;

        Ok(RetrainingStats {
            total_samples: total as usize,
            new_samples: new as usize,
            average_confidence: round2(average.unwrap_or(0.0)),
            qualifying_samples: qualifying as usize,
            ready_for_retrain: qualifying as usize >= min_batch_size,
        })
    }

    /// Cheap liveness probe
    pub async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.db.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(StoreError::Read)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LearningRecord> {
    let sources_raw: String = row.get(4)?;
    let sources_used: BTreeSet<String> = serde_json::from_str(&sources_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(LearningRecord {
        id: row.get(0)?,
        query: row.get(1)?,
        answer: row.get(2)?,
        confidence: row.get(3)?,
        sources_used,
        reasoning: row.get(5)?,
        created_at: parse_timestamp(row, 6)?,
        consumed: row.get::<_, i64>(7)? != 0,
    })
}
