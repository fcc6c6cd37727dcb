//! Shared test doubles for the integration suites.
//!
//! Two fake connections stand in for the out-of-scope driver layer:
//! [`RecordingConnection`] records everything the orchestrator executes
//! and models the run lock, [`ScriptedConnection`] additionally answers
//! queries from a scripted FIFO of result sets for ledger and catalog
//! tests.

// Not every suite uses every helper.
#![allow(dead_code)]

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use schemaflow::{Connection, MigrateError, Result, Row, Value};

/// Connection events observed by a fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Commit,
    Rollback,
    Execute(String),
}

/// Records executed statements and models lock/transaction state.
///
/// Queries always return no rows, which is enough when the orchestrator
/// runs with a `MemoryLedger`.
#[derive(Default)]
pub struct RecordingConnection {
    pub events: Mutex<Vec<Event>>,
    pub locks: Mutex<HashSet<String>>,
    /// When set, any statement containing this substring fails.
    pub fail_on: Option<String>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(substring: &str) -> Self {
        Self {
            fail_on: Some(substring.to_string()),
            ..Self::default()
        }
    }

    /// All executed statements, in order.
    pub fn executed(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// The raw event log.
    pub fn event_log(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Pre-acquire a lock, simulating a concurrent run.
    pub fn hold_lock(&self, name: &str) {
        self.locks.lock().unwrap().insert(name.to_string());
    }

    pub fn lock_held(&self, name: &str) -> bool {
        self.locks.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::Database(
                    format!("simulated failure executing: {}", sql).into(),
                ));
            }
        }
        self.events
            .lock()
            .unwrap()
            .push(Event::Execute(sql.to_string()));
        Ok(0)
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn begin(&self) -> Result<()> {
        self.events.lock().unwrap().push(Event::Begin);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.events.lock().unwrap().push(Event::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.events.lock().unwrap().push(Event::Rollback);
        Ok(())
    }

    async fn try_lock(&self, name: &str) -> Result<bool> {
        Ok(self.locks.lock().unwrap().insert(name.to_string()))
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        self.locks.lock().unwrap().remove(name);
        Ok(())
    }

    fn product(&self) -> &str {
        "postgres"
    }
}

/// Answers queries from a scripted FIFO of result sets.
///
/// Each `query` call pops the next scripted result; running out of script
/// is a test bug and fails loudly. Statements execute as in
/// [`RecordingConnection`].
#[derive(Default)]
pub struct ScriptedConnection {
    pub executed: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<String>>,
    pub results: Mutex<VecDeque<Vec<Row>>>,
    pub locks: Mutex<HashSet<String>>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next query result.
    pub fn push_result(&self, rows: Vec<Row>) {
        self.results.lock().unwrap().push_back(rows);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(1)
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| MigrateError::Database("scripted connection ran out of results".into()))
    }

    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    async fn try_lock(&self, name: &str) -> Result<bool> {
        Ok(self.locks.lock().unwrap().insert(name.to_string()))
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        self.locks.lock().unwrap().remove(name);
        Ok(())
    }

    fn product(&self) -> &str {
        "postgres"
    }
}
