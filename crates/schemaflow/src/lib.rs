//! # schemaflow
//!
//! Dialect-agnostic database schema migration engine.
//!
//! Schema changes are authored as ordered, immutable change sets,
//! discovered from a hierarchy of namespaced definitions, and applied
//! against a target database exactly once each. An execution ledger inside
//! the target database records what ran; an introspection/diff engine
//! turns the live catalog back into the same canonical schema model and
//! surfaces drift.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use schemaflow::{discover, DialectRegistry, Orchestrator, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> schemaflow::Result<()> {
//!     let conn: Arc<dyn schemaflow::Connection> = connect()?;
//!     let registry = DialectRegistry::with_builtins();
//!     let orchestrator = Orchestrator::new(conn, &registry, RunConfig::default())?;
//!
//!     let sets = discover(&load_definitions()?)?;
//!     let report = orchestrator.run(&sets).await?;
//!     println!("applied {} change sets", report.sets_applied);
//!     Ok(())
//! }
//! ```

pub mod change;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod model;
pub mod orchestrator;

// Re-exports for convenient access
pub use change::{build_expected_schema, ChangeSet, ChangeUnit};
pub use config::RunConfig;
pub use connection::{Connection, Row, Value};
pub use dialect::{Dialect, DialectRegistry, Introspector, IntrospectorBuilder, MigrateEngine};
pub use diff::{diff, Discrepancy};
pub use discovery::{discover, ChangeSetDef, Namespace};
pub use error::{MigrateError, Result};
pub use ledger::{verify_checksum, LedgerEntry, LedgerStore, MemoryLedger, SqlLedger};
pub use model::{
    Column, ColumnType, Constraint, ConstraintKind, ForeignRef, Index, Schema, Table, TypeToken,
};
pub use orchestrator::{Orchestrator, RunPhase, RunReport};
