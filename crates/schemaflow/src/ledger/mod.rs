//! Execution ledger: the persisted record of applied change sets.
//!
//! The ledger lives inside the target database itself, in a reserved
//! bookkeeping table created on first use. Every successfully executed
//! change set is recorded with its checksum, the ordinal position it was
//! applied at, and a timestamp. Entries are append-only: a changed
//! checksum for an already-applied identity is drift, never an
//! update-in-place.
//!
//! Storage sits behind the [`LedgerStore`] trait so that the orchestrator
//! never depends on a concrete backend: [`SqlLedger`] is the production
//! implementation, [`MemoryLedger`] backs tests and dry runs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::ChangeSet;
use crate::connection::{Connection, Value};
use crate::dialect::MigrateEngine;
use crate::error::{MigrateError, Result};

/// One applied change set, as recorded in the bookkeeping table.
///
/// Never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Change set identity.
    pub identity: String,

    /// Content checksum at apply time.
    pub checksum: String,

    /// Position in the order of application (1-based, monotonically
    /// increasing).
    pub ordinal: i64,

    /// When the change set was recorded.
    pub applied_at: DateTime<Utc>,

    /// Whether execution succeeded. Always true for entries written by the
    /// orchestrator; the column exists so operators can mark manual repairs.
    pub success: bool,
}

impl LedgerEntry {
    /// Build the entry for a change set applied at the given ordinal.
    pub fn for_applied(set: &ChangeSet, ordinal: i64) -> Self {
        Self {
            identity: set.identity().to_string(),
            checksum: set.checksum().to_string(),
            ordinal,
            applied_at: Utc::now(),
            success: true,
        }
    }
}

/// Compare a change set's current checksum against its ledger entry.
///
/// A mismatch means the authored content changed after it was applied;
/// the orchestrator treats this as fatal and never auto-corrects it.
pub fn verify_checksum(set: &ChangeSet, entry: &LedgerEntry) -> Result<()> {
    if set.checksum() != entry.checksum {
        return Err(MigrateError::DriftDetected {
            identity: entry.identity.clone(),
            recorded: entry.checksum.clone(),
            current: set.checksum().to_string(),
        });
    }
    Ok(())
}

/// Persistence backend for ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the bookkeeping structure if absent. Idempotent.
    async fn ensure_initialized(&self) -> Result<()>;

    /// Load all entries, ordered by ordinal.
    ///
    /// Fails with [`MigrateError::LedgerCorrupt`] if the stored data does
    /// not match the expected shape.
    async fn load_applied(&self) -> Result<Vec<LedgerEntry>>;

    /// Append one entry.
    ///
    /// Fails with [`MigrateError::DuplicateApplication`] if the identity is
    /// already recorded; this guards against races the run lock did not
    /// catch.
    async fn record_applied(&self, entry: &LedgerEntry) -> Result<()>;

    /// Backend name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Ledger stored in the target database's bookkeeping table.
///
/// Table layout: `identity text PRIMARY KEY, checksum text, ordinal bigint
/// UNIQUE, applied_at timestamptz, success boolean`. The bootstrap DDL
/// comes from the active dialect's engine.
pub struct SqlLedger {
    conn: Arc<dyn Connection>,
    engine: Arc<dyn MigrateEngine>,
    table: String,
}

impl SqlLedger {
    /// Create a ledger over the given session and bookkeeping table name.
    pub fn new(
        conn: Arc<dyn Connection>,
        engine: Arc<dyn MigrateEngine>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            engine,
            table: table.into(),
        }
    }

    /// The bookkeeping table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn select_sql(&self) -> Result<String> {
        Ok(format!(
            "SELECT identity, checksum, ordinal, applied_at, success FROM {} ORDER BY ordinal",
            self.engine.quote_ident(&self.table)?
        ))
    }

    fn exists_sql(&self) -> Result<String> {
        Ok(format!(
            "SELECT 1 FROM {} WHERE identity = {}",
            self.engine.quote_ident(&self.table)?,
            self.engine.param_placeholder(1)
        ))
    }

    fn insert_sql(&self) -> Result<String> {
        Ok(format!(
            "INSERT INTO {} (identity, checksum, ordinal, applied_at, success) \
             VALUES ({}, {}, {}, {}, {})",
            self.engine.quote_ident(&self.table)?,
            self.engine.param_placeholder(1),
            self.engine.param_placeholder(2),
            self.engine.param_placeholder(3),
            self.engine.param_placeholder(4),
            self.engine.param_placeholder(5),
        ))
    }
}

#[async_trait]
impl LedgerStore for SqlLedger {
    async fn ensure_initialized(&self) -> Result<()> {
        for statement in self.engine.ledger_table_ddl(&self.table)? {
            self.conn.execute(&statement, &[]).await?;
        }
        debug!(table = %self.table, "ledger bookkeeping table ready");
        Ok(())
    }

    async fn load_applied(&self) -> Result<Vec<LedgerEntry>> {
        let rows = self.conn.query(&self.select_sql()?, &[]).await?;
        let mut entries = Vec::with_capacity(rows.len());
        let mut last_ordinal = 0i64;

        for row in rows {
            if row.len() != 5 {
                return Err(MigrateError::LedgerCorrupt(format!(
                    "bookkeeping table {} returned a {}-column row, expected 5",
                    self.table,
                    row.len()
                )));
            }

            let entry = LedgerEntry {
                identity: row[0]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.shape_error("identity", &row[0]))?,
                checksum: row[1]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.shape_error("checksum", &row[1]))?,
                ordinal: row[2]
                    .as_i64()
                    .ok_or_else(|| self.shape_error("ordinal", &row[2]))?,
                applied_at: row[3]
                    .as_timestamp()
                    .ok_or_else(|| self.shape_error("applied_at", &row[3]))?,
                success: row[4]
                    .as_bool()
                    .ok_or_else(|| self.shape_error("success", &row[4]))?,
            };

            if entry.ordinal <= last_ordinal {
                return Err(MigrateError::LedgerCorrupt(format!(
                    "ordinals are not strictly increasing at {} (ordinal {})",
                    entry.identity, entry.ordinal
                )));
            }
            last_ordinal = entry.ordinal;
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn record_applied(&self, entry: &LedgerEntry) -> Result<()> {
        let existing = self
            .conn
            .query(&self.exists_sql()?, &[Value::from(entry.identity.clone())])
            .await?;
        if !existing.is_empty() {
            return Err(MigrateError::DuplicateApplication {
                identity: entry.identity.clone(),
            });
        }

        self.conn
            .execute(
                &self.insert_sql()?,
                &[
                    Value::from(entry.identity.clone()),
                    Value::from(entry.checksum.clone()),
                    Value::from(entry.ordinal),
                    Value::from(entry.applied_at),
                    Value::from(entry.success),
                ],
            )
            .await?;
        debug!(identity = %entry.identity, ordinal = entry.ordinal, "recorded applied change set");
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "sql"
    }
}

impl SqlLedger {
    fn shape_error(&self, column: &str, value: &Value) -> MigrateError {
        MigrateError::LedgerCorrupt(format!(
            "bookkeeping table {} column {} holds unexpected value {:?}",
            self.table, column, value
        ))
    }
}

/// In-process ledger backend.
///
/// Backs tests and dry runs; nothing is persisted beyond the process.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    /// Create an empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with existing entries (test setup).
    pub fn with_entries(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Snapshot of the current entries.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().expect("ledger mutex poisoned").clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn ensure_initialized(&self) -> Result<()> {
        Ok(())
    }

    async fn load_applied(&self) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.entries();
        entries.sort_by_key(|e| e.ordinal);
        Ok(entries)
    }

    async fn record_applied(&self, entry: &LedgerEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("ledger mutex poisoned");
        if entries.iter().any(|e| e.identity == entry.identity) {
            return Err(MigrateError::DuplicateApplication {
                identity: entry.identity.clone(),
            });
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
