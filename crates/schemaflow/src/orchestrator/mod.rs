//! Migration orchestrator - the top-level control loop.
//!
//! A run moves through `Idle -> Locking -> Planning -> Executing ->
//! Recording -> Idle`, with an early exit to `Failed` from any phase.
//! Discovery hands the orchestrator an ordered, read-only sequence of
//! change sets; the orchestrator consults the ledger for what already ran,
//! translates the pending remainder through the active dialect's engine,
//! executes each change set against the target, and records every success
//! immediately - so a crash can leave at most one partially-applied,
//! unrecorded change set behind.
//!
//! The exclusive run lock is held for the whole run and released on every
//! exit path, including failure, before the causing error propagates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::change::{build_expected_schema, ChangeSet};
use crate::config::RunConfig;
use crate::connection::Connection;
use crate::dialect::{Dialect, DialectRegistry};
use crate::diff::{diff, Discrepancy};
use crate::error::{MigrateError, Result};
use crate::ledger::{verify_checksum, LedgerEntry, LedgerStore, SqlLedger};

/// Phases of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Locking,
    Planning,
    Executing,
    Recording,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Locking => "locking",
            RunPhase::Planning => "planning",
            RunPhase::Executing => "executing",
            RunPhase::Recording => "recording",
            RunPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Change sets handed over by discovery.
    pub sets_discovered: usize,

    /// Change sets that were pending at plan time.
    pub sets_pending: usize,

    /// Change sets applied (and recorded) by this run.
    pub sets_applied: usize,

    /// Statements executed against the target.
    pub statements_executed: usize,

    /// Whether this was a dry run (nothing executed, nothing recorded).
    pub dry_run: bool,

    /// Identities applied by this run, in execution order. For a dry run,
    /// the identities that would have been applied.
    pub applied_identities: Vec<String>,
}

/// Migration orchestrator.
///
/// Owns the target connection and the active dialect for the duration of
/// a run. Change sets execute strictly sequentially: later units may
/// depend on earlier ones, and ledger ordinals require a total order.
pub struct Orchestrator {
    conn: Arc<dyn Connection>,
    dialect: Arc<Dialect>,
    ledger: Arc<dyn LedgerStore>,
    config: RunConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("dialect", &self.dialect.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with a SQL-backed ledger in the target
    /// database.
    ///
    /// The active dialect comes from `config.dialect` when set, otherwise
    /// from probing the connection's product identity.
    pub fn new(
        conn: Arc<dyn Connection>,
        registry: &DialectRegistry,
        config: RunConfig,
    ) -> Result<Self> {
        config.validate()?;
        let dialect = match &config.dialect {
            Some(name) => registry.require(name)?,
            None => registry.select_for_product(conn.product())?,
        };
        let ledger = Arc::new(SqlLedger::new(
            conn.clone(),
            dialect.engine.clone(),
            config.ledger_table.clone(),
        ));
        Ok(Self {
            conn,
            dialect,
            ledger,
            config,
        })
    }

    /// Create an orchestrator with an explicit ledger backend.
    pub fn with_ledger(
        conn: Arc<dyn Connection>,
        dialect: Arc<Dialect>,
        ledger: Arc<dyn LedgerStore>,
        config: RunConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            conn,
            dialect,
            ledger,
            config,
        })
    }

    /// The active dialect.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Compute the pending plan without mutating anything.
    ///
    /// Loads applied entries, verifies the checksum of every one of them
    /// (fatal [`MigrateError::DriftDetected`] on any mismatch, including an
    /// applied identity whose definition disappeared), then returns the
    /// subset of `sets` absent from the ledger, in discovery order - never
    /// re-sorted.
    pub async fn plan(&self, sets: &[ChangeSet]) -> Result<Vec<ChangeSet>> {
        Ok(self.plan_inner(sets).await?.1)
    }

    async fn plan_inner(&self, sets: &[ChangeSet]) -> Result<(Vec<LedgerEntry>, Vec<ChangeSet>)> {
        self.ledger.ensure_initialized().await?;
        let applied = self.ledger.load_applied().await?;

        for entry in &applied {
            match sets.iter().find(|s| s.identity() == entry.identity) {
                Some(set) => verify_checksum(set, entry)?,
                None => {
                    // A recorded change set whose definition is gone is
                    // drift just as much as edited content.
                    return Err(MigrateError::DriftDetected {
                        identity: entry.identity.clone(),
                        recorded: entry.checksum.clone(),
                        current: "(definition not found)".to_string(),
                    });
                }
            }
        }

        let pending: Vec<ChangeSet> = sets
            .iter()
            .filter(|s| !applied.iter().any(|e| e.identity == s.identity()))
            .cloned()
            .collect();

        debug!(
            applied = applied.len(),
            pending = pending.len(),
            "plan computed"
        );
        Ok((applied, pending))
    }

    /// Run the migration: lock, plan, execute, record.
    pub async fn run(&self, sets: &[ChangeSet]) -> Result<RunReport> {
        info!(phase = %RunPhase::Locking, lock = %self.config.lock_name, "acquiring run lock");
        if !self.conn.try_lock(&self.config.lock_name).await? {
            return Err(MigrateError::LockUnavailable {
                lock_name: self.config.lock_name.clone(),
            });
        }

        let result = self.run_locked(sets).await;

        // Terminal states release the lock before the outcome propagates.
        if let Err(unlock_err) = self.conn.unlock(&self.config.lock_name).await {
            warn!(error = %unlock_err, "failed to release run lock");
            if result.is_ok() {
                return Err(unlock_err);
            }
        }

        if let Err(err) = &result {
            error!(phase = %RunPhase::Failed, error = %err, "migration run failed");
        }
        result
    }

    async fn run_locked(&self, sets: &[ChangeSet]) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, phase = %RunPhase::Planning, "planning migration run");

        let (applied_before, pending) = self.plan_inner(sets).await?;

        let mut next_ordinal = applied_before.last().map(|e| e.ordinal).unwrap_or(0);
        let mut statements_executed = 0usize;
        let mut applied_identities = Vec::new();

        for set in &pending {
            next_ordinal += 1;
            let count = self.apply_change_set(set, next_ordinal).await?;
            statements_executed += count;
            applied_identities.push(set.identity().to_string());
        }

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        info!(
            run_id = %run_id,
            applied = applied_identities.len(),
            statements = statements_executed,
            dry_run = self.config.dry_run,
            "migration run complete"
        );

        Ok(RunReport {
            run_id,
            started_at,
            completed_at,
            duration_seconds,
            sets_discovered: sets.len(),
            sets_pending: pending.len(),
            sets_applied: if self.config.dry_run {
                0
            } else {
                applied_identities.len()
            },
            statements_executed,
            dry_run: self.config.dry_run,
            applied_identities,
        })
    }

    /// Translate and execute one change set, then record it.
    ///
    /// Every unit is translated before anything executes, so an
    /// unsupported operation aborts the run without touching the database.
    /// With transactional DDL the set runs in its own transaction and a
    /// mid-set failure rolls the database back to the state before the
    /// set; without it, the documented leak boundary is this one set.
    async fn apply_change_set(&self, set: &ChangeSet, ordinal: i64) -> Result<usize> {
        let mut statements = Vec::new();
        for unit in set.units() {
            statements.extend(self.dialect.engine.translate(unit)?);
        }

        if self.config.dry_run {
            info!(
                identity = %set.identity(),
                statements = statements.len(),
                "dry run: skipping execution"
            );
            return Ok(0);
        }

        info!(
            phase = %RunPhase::Executing,
            identity = %set.identity(),
            ordinal,
            statements = statements.len(),
            "executing change set"
        );

        let transactional = self.config.transactional && self.dialect.transactional_ddl;
        if transactional {
            self.conn.begin().await?;
        }

        let mut executed = 0usize;
        for sql in &statements {
            if let Err(err) = self.conn.execute(sql, &[]).await {
                if transactional {
                    if let Err(rollback_err) = self.conn.rollback().await {
                        warn!(error = %rollback_err, "rollback failed after statement error");
                    }
                }
                return Err(MigrateError::statement(
                    set.identity(),
                    ordinal,
                    sql.clone(),
                    err.to_string(),
                ));
            }
            executed += 1;
        }

        if transactional {
            self.conn.commit().await?;
        }

        debug!(phase = %RunPhase::Recording, identity = %set.identity(), ordinal, "recording ledger entry");
        self.ledger
            .record_applied(&LedgerEntry::for_applied(set, ordinal))
            .await?;

        Ok(executed)
    }

    /// Diff the live database against the model implied by the applied
    /// change sets.
    ///
    /// Applied entries whose definitions are absent from `sets` cannot
    /// contribute to the expected model and are skipped with a warning;
    /// the structural comparison still reports whatever their objects left
    /// behind as extra.
    pub async fn drift_report(&self, sets: &[ChangeSet]) -> Result<Vec<Discrepancy>> {
        self.ledger.ensure_initialized().await?;
        let applied = self.ledger.load_applied().await?;

        let mut applied_sets = Vec::new();
        for entry in &applied {
            match sets.iter().find(|s| s.identity() == entry.identity) {
                Some(set) => applied_sets.push(set.clone()),
                None => warn!(
                    identity = %entry.identity,
                    "applied change set has no definition; skipping in expected model"
                ),
            }
        }
        let expected = build_expected_schema(&applied_sets)?;

        let introspector = self.dialect.introspector.build(self.conn.clone());
        let mut actual = introspector.snapshot().await?;
        // The bookkeeping table is ours, not drift.
        actual.tables.remove(&self.config.ledger_table);

        Ok(diff(&expected, &actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_phase_display() {
        assert_eq!(RunPhase::Planning.to_string(), "planning");
        assert_eq!(RunPhase::Failed.to_string(), "failed");
    }

    #[test]
    fn test_run_report_serializes() {
        let report = RunReport {
            run_id: "r".into(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 0.5,
            sets_discovered: 2,
            sets_pending: 1,
            sets_applied: 1,
            statements_executed: 3,
            dry_run: false,
            applied_identities: vec!["app/A".into()],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"sets_applied\":1"));
        assert!(json.contains("app/A"));
    }
}
