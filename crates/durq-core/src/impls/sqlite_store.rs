//! SqliteRecordStore - one table row per message record.
//!
//! The table name is configurable so several queues can share a database.
//! Timestamps are stored as microseconds since the epoch; integer order is
//! creation order, which text timestamps do not guarantee.
//!
//! Schema:
//! ```text
//! id          TEXT PRIMARY KEY   -- bare ULID
//! content     BLOB NOT NULL
//! created_at  INTEGER NOT NULL   -- unix micros
//! exec_count  INTEGER NOT NULL
//! state       INTEGER NOT NULL   -- 0 pending, 1 in flight, 2 retry, 3 dead
//! finished_at INTEGER            -- unix micros
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::domain::MessageId;
use crate::ports::{RecordStore, StoreError, StoreResult};
use crate::queue::{MessageRecord, MessageState, RecordUpdate};

pub struct SqliteRecordStore {
    pool: SqlitePool,
    table: String,
}

/// `[A-Za-z_][A-Za-z0-9_]*` - the table name is spliced into SQL text.
pub fn is_valid_table_name(table: &str) -> bool {
    let mut chars = table.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqliteRecordStore {
    /// Opens (creating if missing) the database at `path`, or a private
    /// in-memory database when `path` is `None`, and ensures the table exists.
    pub async fn connect(path: Option<&str>, table: &str) -> StoreResult<Self> {
        let opts = match path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            None => SqliteConnectOptions::new().in_memory(true),
        }
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));

        let pool = match path {
            Some(_) => SqlitePoolOptions::new().connect_with(opts).await?,
            // Every connection to `:memory:` is its own database; pin one.
            None => {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(opts)
                    .await?
            }
        };

        Self::with_pool(pool, table).await
    }

    /// Uses an existing pool; ensures the table exists.
    pub async fn with_pool(pool: SqlitePool, table: &str) -> StoreResult<Self> {
        if !is_valid_table_name(table) {
            return Err(StoreError::Backend(format!("invalid table name: {table:?}")));
        }

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let t = &self.table;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                id TEXT PRIMARY KEY NOT NULL,
                content BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                exec_count INTEGER NOT NULL DEFAULT 0,
                state INTEGER NOT NULL,
                finished_at INTEGER
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {t}_state_created ON {t} (state, created_at, id)"
        ))
        .execute(&self.pool)
        .await?;

        debug!(table = %t, "record table ready");
        Ok(())
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {micros}")))
}

fn decode_row(row: &SqliteRow) -> StoreResult<MessageRecord> {
    let raw_id: String = row.try_get("id")?;
    let id: MessageId = raw_id
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{e}")))?;

    let raw_state: i64 = row.try_get("state")?;
    let state = MessageState::from_i64(raw_state)
        .ok_or_else(|| StoreError::Corrupt(format!("{id}: unknown state {raw_state}")))?;

    let exec_count: i64 = row.try_get("exec_count")?;
    let exec_count = u32::try_from(exec_count)
        .map_err(|_| StoreError::Corrupt(format!("{id}: exec_count {exec_count}")))?;

    let finished_at: Option<i64> = row.try_get("finished_at")?;

    Ok(MessageRecord {
        id,
        content: row.try_get("content")?,
        created_at: from_micros(row.try_get("created_at")?)?,
        exec_count,
        state,
        finished_at: finished_at.map(from_micros).transpose()?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &MessageRecord) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, content, created_at, exec_count, state, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.table
        ))
        .bind(record.id.to_storage_key())
        .bind(record.content.as_slice())
        .bind(to_micros(record.created_at))
        .bind(i64::from(record.exec_count))
        .bind(record.state.as_i64())
        .bind(record.finished_at.map(to_micros))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: MessageId) -> StoreResult<Option<MessageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT id, content, created_at, exec_count, state, finished_at
             FROM {} WHERE id = $1",
            self.table
        ))
        .bind(id.to_storage_key())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn delete(&self, id: MessageId) -> StoreResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table))
            .bind(id.to_storage_key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update(&self, id: MessageId, update: RecordUpdate) -> StoreResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET
                state = $1,
                exec_count = COALESCE($2, exec_count),
                finished_at = COALESCE($3, finished_at)
             WHERE id = $4",
            self.table
        ))
        .bind(update.state.as_i64())
        .bind(update.exec_count.map(i64::from))
        .bind(update.finished_at.map(to_micros))
        .bind(id.to_storage_key())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition_if(
        &self,
        id: MessageId,
        from: &[MessageState],
        to: MessageState,
    ) -> StoreResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }

        let placeholders = (3..from.len() + 3)
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET state = $1 WHERE id = $2 AND state IN ({placeholders})",
            self.table
        );

        let mut query = sqlx::query(&sql).bind(to.as_i64()).bind(id.to_storage_key());
        for state in from {
            query = query.bind(state.as_i64());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition_all(&self, from: MessageState, to: MessageState) -> StoreResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET state = $1 WHERE state = $2",
            self.table
        ))
        .bind(to.as_i64())
        .bind(from.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn scan_ids(
        &self,
        states: &[MessageState],
        limit: usize,
    ) -> StoreResult<Vec<MessageId>> {
        if states.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = (1..=states.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id FROM {} WHERE state IN ({placeholders})
             ORDER BY created_at, id LIMIT ${}",
            self.table,
            states.len() + 1
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for state in states {
            query = query.bind(state.as_i64());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|raw| {
                raw.parse::<MessageId>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }
}
