use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{MessageRecord, MessageStatus, StatusTransition};
use crate::utils::time::now_utc_rfc3339;

pub const SQLITE_SCHEMA_VERSION: &str = "wachat.v1.sqlite.v1";
pub const MESSAGES_TABLE: &str = "processed_messages";
pub const STATUS_HISTORY_TABLE: &str = "status_history";
pub const INGEST_RUNS_TABLE: &str = "ingest_runs";
pub const SCHEMA_META_TABLE: &str = "wachat_schema_meta";

const CREATE_MESSAGES_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS processed_messages (
    message_id TEXT NOT NULL PRIMARY KEY,
    meta_msg_id TEXT,
    wa_id TEXT NOT NULL,
    user_name TEXT NOT NULL,
    message_body TEXT NOT NULL,
    timestamp_utc TEXT NOT NULL,
    timestamp_unix_ms INTEGER NOT NULL,
    status TEXT NOT NULL,
    message_type TEXT NOT NULL,
    from_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    payload_id TEXT,
    phone_number_id TEXT,
    display_phone_number TEXT,
    created_at_utc TEXT NOT NULL,
    updated_at_utc TEXT NOT NULL,
    CHECK (status IN ('sent', 'delivered', 'read')),
    CHECK (timestamp_unix_ms >= 0)
);
"#;

const CREATE_INDEX_META_MSG_ID_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_processed_messages_meta_msg_id
ON processed_messages (meta_msg_id);
"#;

const CREATE_INDEX_CONVERSATION_TIME_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_processed_messages_conversation_time
ON processed_messages (conversation_id, timestamp_unix_ms);
"#;

const CREATE_INDEX_WA_ID_TIME_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_processed_messages_wa_id_time
ON processed_messages (wa_id, timestamp_unix_ms);
"#;

const CREATE_STATUS_HISTORY_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS status_history (
    message_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    status TEXT NOT NULL,
    timestamp_utc TEXT NOT NULL,
    timestamp_unix_ms INTEGER NOT NULL,
    applied_at_utc TEXT NOT NULL,
    PRIMARY KEY (message_id, sequence),
    CHECK (status IN ('sent', 'delivered', 'read')),
    CHECK (sequence >= 1),
    FOREIGN KEY(message_id) REFERENCES processed_messages(message_id)
);
"#;

const CREATE_INGEST_RUNS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_runs (
    ingest_run_id TEXT NOT NULL PRIMARY KEY,
    started_at_utc TEXT NOT NULL,
    finished_at_utc TEXT,
    status TEXT NOT NULL,
    payload_dir TEXT NOT NULL,
    files_read INTEGER NOT NULL DEFAULT 0,
    messages_inserted INTEGER NOT NULL DEFAULT 0,
    statuses_applied INTEGER NOT NULL DEFAULT 0,
    statuses_unresolved INTEGER NOT NULL DEFAULT 0,
    warnings_count INTEGER NOT NULL DEFAULT 0,
    error_summary_json TEXT NOT NULL DEFAULT '{}',
    CHECK (status IN ('running', 'success', 'failed')),
    CHECK (files_read >= 0),
    CHECK (messages_inserted >= 0),
    CHECK (statuses_applied >= 0),
    CHECK (statuses_unresolved >= 0),
    CHECK (warnings_count >= 0)
);
"#;

const CREATE_INDEX_INGEST_RUNS_STATUS_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ingest_runs_status_time
ON ingest_runs (status, started_at_utc);
"#;

const CREATE_META_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS wachat_schema_meta (
    schema_version TEXT NOT NULL,
    applied_at_utc TEXT NOT NULL
);
"#;

const MESSAGE_COLUMNS: &str = "message_id, meta_msg_id, wa_id, user_name, message_body, \
     timestamp_utc, timestamp_unix_ms, status, message_type, from_id, conversation_id, \
     payload_id, phone_number_id, display_phone_number, created_at_utc, updated_at_utc";

#[must_use]
pub fn schema_statements() -> &'static [&'static str] {
    &[
        CREATE_MESSAGES_TABLE_SQL,
        CREATE_INDEX_META_MSG_ID_SQL,
        CREATE_INDEX_CONVERSATION_TIME_SQL,
        CREATE_INDEX_WA_ID_TIME_SQL,
        CREATE_STATUS_HISTORY_TABLE_SQL,
        CREATE_INGEST_RUNS_TABLE_SQL,
        CREATE_INDEX_INGEST_RUNS_STATUS_SQL,
        CREATE_META_TABLE_SQL,
    ]
}

#[must_use]
pub fn create_schema_sql() -> String {
    schema_statements().join("\n")
}

pub fn open_sqlite_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create sqlite parent directory: {}",
                parent.display()
            )
        })?;
    }

    Connection::open(path)
        .with_context(|| format!("failed to open sqlite database: {}", path.display()))
}

pub fn ensure_sqlite_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(&create_schema_sql())
        .context("failed to create sqlite schema")?;

    if schema_meta_has_version(connection, SQLITE_SCHEMA_VERSION)? {
        return Ok(());
    }

    let applied_at_utc = now_utc_rfc3339()?;
    connection
        .execute(
            &format!(
                "INSERT INTO {SCHEMA_META_TABLE} (schema_version, applied_at_utc) VALUES (?1, ?2)"
            ),
            params![SQLITE_SCHEMA_VERSION, applied_at_utc],
        )
        .context("failed to write sqlite schema meta row")?;

    Ok(())
}

fn schema_meta_has_version(connection: &Connection, schema_version: &str) -> Result<bool> {
    let query = format!(
        "SELECT EXISTS(SELECT 1 FROM {SCHEMA_META_TABLE} WHERE schema_version = ?1 LIMIT 1)"
    );
    let exists = connection
        .query_row(&query, [schema_version], |row| row.get::<usize, i64>(0))
        .context("failed to query sqlite schema version metadata")?;
    Ok(exists != 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent(MessageRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestRunState {
    Running,
    Success,
    Failed,
}

impl IngestRunState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestRunTotals {
    pub files_read: usize,
    pub messages_inserted: usize,
    pub statuses_applied: usize,
    pub statuses_unresolved: usize,
    pub warnings_count: usize,
}

/// Handle over the processed-message database.
///
/// Each mutating call runs in its own transaction; reads always hit the
/// database.
#[derive(Debug)]
pub struct MessageStore {
    connection: Connection,
}

impl MessageStore {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = open_sqlite_connection(path)?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory sqlite database")?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection
            .pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable sqlite foreign keys")?;
        ensure_sqlite_schema(&connection)?;
        Ok(Self { connection })
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Inserts `record` unless its message id is already stored, in which case
    /// the stored record is returned untouched.
    pub fn insert_if_absent(&mut self, record: &MessageRecord) -> Result<InsertOutcome> {
        let tx = self
            .connection
            .transaction()
            .context("failed to open sqlite transaction")?;
        let inserted = tx
            .execute(
                &format!(
                    "INSERT INTO {MESSAGES_TABLE} ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                     ON CONFLICT(message_id) DO NOTHING"
                ),
                params![
                    record.message_id,
                    record.meta_msg_id,
                    record.wa_id,
                    record.user_name,
                    record.message_body,
                    record.timestamp_utc,
                    to_i64(record.timestamp_unix_ms, "timestamp_unix_ms")?,
                    record.status.as_str(),
                    record.message_type,
                    record.from,
                    record.conversation_id,
                    record.payload_id,
                    record.phone_number_id,
                    record.display_phone_number,
                    record.created_at_utc,
                    record.updated_at_utc,
                ],
            )
            .with_context(|| format!("failed to insert message_id={}", record.message_id))?;

        if inserted == 1 {
            for (index, transition) in record.status_history.iter().enumerate() {
                insert_history_row(&tx, &record.message_id, index + 1, transition)?;
            }
        }
        tx.commit()
            .context("failed to commit message insert transaction")?;

        if inserted == 1 {
            return Ok(InsertOutcome::Inserted);
        }
        let existing = self
            .find_by_message_id(&record.message_id)?
            .ok_or_else(|| anyhow!("message {} vanished after conflict", record.message_id))?;
        Ok(InsertOutcome::AlreadyPresent(existing))
    }

    pub fn find_by_message_id(&self, message_id: &str) -> Result<Option<MessageRecord>> {
        self.find_one("message_id = ?1", message_id)
    }

    /// Sets the current status of the message `identifier` refers to (primary
    /// id first, then `meta_msg_id`) and appends `transition` to its history.
    /// Returns `None` when no message matches. No ordering check is made
    /// against earlier transitions.
    pub fn apply_status(
        &mut self,
        identifier: &str,
        transition: &StatusTransition,
    ) -> Result<Option<MessageRecord>> {
        let tx = self
            .connection
            .transaction()
            .context("failed to open sqlite transaction")?;

        let Some(message_id) = resolve_message_id(&tx, identifier)? else {
            return Ok(None);
        };

        tx.execute(
            &format!(
                "UPDATE {MESSAGES_TABLE} SET status = ?2, updated_at_utc = ?3 WHERE message_id = ?1"
            ),
            params![
                message_id,
                transition.status.as_str(),
                transition.applied_at_utc
            ],
        )
        .with_context(|| format!("failed to update status for message_id={message_id}"))?;

        let next_sequence: i64 = tx
            .query_row(
                &format!(
                    "SELECT COALESCE(MAX(sequence), 0) + 1 FROM {STATUS_HISTORY_TABLE}
                     WHERE message_id = ?1"
                ),
                [&message_id],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to read history sequence for {message_id}"))?;
        let next_sequence = usize::try_from(next_sequence)
            .map_err(|_| anyhow!("history sequence out of range for {message_id}"))?;
        insert_history_row(&tx, &message_id, next_sequence, transition)?;

        tx.commit()
            .context("failed to commit status update transaction")?;
        self.find_by_message_id(&message_id)
    }

    pub fn count_messages(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row(&format!("SELECT COUNT(*) FROM {MESSAGES_TABLE}"), [], |row| {
                row.get(0)
            })
            .context("failed to count processed messages")?;
        to_usize(count, "message count")
    }

    pub fn status_counts(&self) -> Result<BTreeMap<MessageStatus, usize>> {
        let mut statement = self
            .connection
            .prepare(&format!(
                "SELECT status, COUNT(*) FROM {MESSAGES_TABLE} GROUP BY status"
            ))
            .context("failed to prepare status count query")?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("failed to run status count query")?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row.context("failed to read status count row")?;
            let status = status
                .parse::<MessageStatus>()
                .with_context(|| format!("stored status is invalid: {status}"))?;
            counts.insert(status, to_usize(count, "status count")?);
        }
        Ok(counts)
    }

    /// Every record, oldest first.
    pub fn all_messages(&self) -> Result<Vec<MessageRecord>> {
        self.find_many("1 = 1", &[], "timestamp_unix_ms ASC, message_id ASC")
    }

    pub fn messages_for_wa_id(&self, wa_id: &str) -> Result<Vec<MessageRecord>> {
        self.find_many(
            "wa_id = ?1",
            &[wa_id],
            "timestamp_unix_ms ASC, message_id ASC",
        )
    }

    pub fn messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        self.find_many(
            "conversation_id = ?1",
            &[conversation_id],
            "timestamp_unix_ms ASC, message_id ASC",
        )
    }

    /// Newest first.
    pub fn message_page(&self, offset: usize, limit: usize) -> Result<Vec<MessageRecord>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM {MESSAGES_TABLE}
             ORDER BY timestamp_unix_ms DESC, message_id DESC
             LIMIT ?1 OFFSET ?2"
        );
        let mut statement = self
            .connection
            .prepare(&query)
            .context("failed to prepare message page query")?;
        let rows = statement
            .query_map(
                params![to_i64_usize(limit, "limit")?, to_i64_usize(offset, "offset")?],
                record_from_row,
            )
            .context("failed to run message page query")?;
        self.collect_with_history(rows)
    }

    pub fn begin_ingest_run(
        &self,
        ingest_run_id: &str,
        started_at_utc: &str,
        payload_dir: &str,
    ) -> Result<()> {
        self.connection
            .execute(
                &format!(
                    "INSERT INTO {INGEST_RUNS_TABLE}
                     (ingest_run_id, started_at_utc, status, payload_dir)
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    ingest_run_id,
                    started_at_utc,
                    IngestRunState::Running.as_str(),
                    payload_dir
                ],
            )
            .with_context(|| format!("failed to insert ingest run start row: {ingest_run_id}"))?;
        Ok(())
    }

    pub fn finalize_ingest_run(
        &self,
        ingest_run_id: &str,
        state: IngestRunState,
        finished_at_utc: &str,
        totals: IngestRunTotals,
        error_summary_json: &str,
    ) -> Result<()> {
        self.connection
            .execute(
                &format!(
                    "UPDATE {INGEST_RUNS_TABLE}
                     SET finished_at_utc = ?2,
                         status = ?3,
                         files_read = ?4,
                         messages_inserted = ?5,
                         statuses_applied = ?6,
                         statuses_unresolved = ?7,
                         warnings_count = ?8,
                         error_summary_json = ?9
                     WHERE ingest_run_id = ?1"
                ),
                params![
                    ingest_run_id,
                    finished_at_utc,
                    state.as_str(),
                    to_i64_usize(totals.files_read, "files_read")?,
                    to_i64_usize(totals.messages_inserted, "messages_inserted")?,
                    to_i64_usize(totals.statuses_applied, "statuses_applied")?,
                    to_i64_usize(totals.statuses_unresolved, "statuses_unresolved")?,
                    to_i64_usize(totals.warnings_count, "warnings_count")?,
                    error_summary_json,
                ],
            )
            .with_context(|| format!("failed to finalize ingest run row: {ingest_run_id}"))?;
        Ok(())
    }

    fn find_one(&self, predicate: &str, value: &str) -> Result<Option<MessageRecord>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM {MESSAGES_TABLE} WHERE {predicate}
             ORDER BY timestamp_unix_ms ASC, message_id ASC LIMIT 1"
        );
        let record = self
            .connection
            .query_row(&query, [value], record_from_row)
            .optional()
            .with_context(|| format!("failed to look up message by {predicate}"))?;

        match record {
            Some(mut record) => {
                record.status_history = self.load_history(&record.message_id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn find_many(
        &self,
        predicate: &str,
        values: &[&str],
        order_by: &str,
    ) -> Result<Vec<MessageRecord>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM {MESSAGES_TABLE} WHERE {predicate} ORDER BY {order_by}"
        );
        let mut statement = self
            .connection
            .prepare(&query)
            .context("failed to prepare message list query")?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(values.iter()), record_from_row)
            .context("failed to run message list query")?;
        self.collect_with_history(rows)
    }

    fn collect_with_history(
        &self,
        rows: impl Iterator<Item = rusqlite::Result<MessageRecord>>,
    ) -> Result<Vec<MessageRecord>> {
        let mut records = Vec::new();
        for row in rows {
            let mut record = row.context("failed to decode processed message row")?;
            record.status_history = self.load_history(&record.message_id)?;
            records.push(record);
        }
        Ok(records)
    }

    fn load_history(&self, message_id: &str) -> Result<Vec<StatusTransition>> {
        let mut statement = self
            .connection
            .prepare_cached(&format!(
                "SELECT status, timestamp_utc, timestamp_unix_ms, applied_at_utc
                 FROM {STATUS_HISTORY_TABLE} WHERE message_id = ?1 ORDER BY sequence ASC"
            ))
            .context("failed to prepare status history query")?;
        let rows = statement
            .query_map([message_id], |row| {
                Ok(StatusTransition {
                    status: parse_status_column(row, 0)?,
                    timestamp_utc: row.get(1)?,
                    timestamp_unix_ms: u64_column(row, 2)?,
                    applied_at_utc: row.get(3)?,
                })
            })
            .with_context(|| format!("failed to load status history for {message_id}"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to decode status history for {message_id}"))
    }
}

fn resolve_message_id(connection: &Connection, identifier: &str) -> Result<Option<String>> {
    for column in ["message_id", "meta_msg_id"] {
        let found = connection
            .query_row(
                &format!(
                    "SELECT message_id FROM {MESSAGES_TABLE} WHERE {column} = ?1
                     ORDER BY timestamp_unix_ms ASC, message_id ASC LIMIT 1"
                ),
                [identifier],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to match status target by {column}"))?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

fn insert_history_row(
    connection: &Connection,
    message_id: &str,
    sequence: usize,
    transition: &StatusTransition,
) -> Result<()> {
    connection
        .execute(
            &format!(
                "INSERT INTO {STATUS_HISTORY_TABLE}
                 (message_id, sequence, status, timestamp_utc, timestamp_unix_ms, applied_at_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                message_id,
                to_i64_usize(sequence, "sequence")?,
                transition.status.as_str(),
                transition.timestamp_utc,
                to_i64(transition.timestamp_unix_ms, "timestamp_unix_ms")?,
                transition.applied_at_utc,
            ],
        )
        .with_context(|| format!("failed to append status history for {message_id}"))?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        message_id: row.get(0)?,
        meta_msg_id: row.get(1)?,
        wa_id: row.get(2)?,
        user_name: row.get(3)?,
        message_body: row.get(4)?,
        timestamp_utc: row.get(5)?,
        timestamp_unix_ms: u64_column(row, 6)?,
        status: parse_status_column(row, 7)?,
        message_type: row.get(8)?,
        from: row.get(9)?,
        conversation_id: row.get(10)?,
        payload_id: row.get(11)?,
        phone_number_id: row.get(12)?,
        display_phone_number: row.get(13)?,
        status_history: Vec::new(),
        created_at_utc: row.get(14)?,
        updated_at_utc: row.get(15)?,
    })
}

fn parse_status_column(row: &Row<'_>, index: usize) -> rusqlite::Result<MessageStatus> {
    let raw: String = row.get(index)?;
    raw.parse::<MessageStatus>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}

fn u64_column(row: &Row<'_>, index: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(index)?;
    u64::try_from(raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Integer,
            Box::new(error),
        )
    })
}

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{field} exceeds sqlite INTEGER range"))
}

fn to_i64_usize(value: usize, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{field} exceeds sqlite INTEGER range"))
}

fn to_usize(value: i64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("{field} is negative or out of range"))
}
