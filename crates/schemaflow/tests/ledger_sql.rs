//! SQL-backed ledger behavior against a scripted connection.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::ScriptedConnection;
use schemaflow::{
    ChangeSet, ChangeUnit, Column, DialectRegistry, LedgerEntry, LedgerStore, MigrateError,
    SqlLedger, Table, TypeToken, Value,
};

fn sql_ledger(conn: Arc<ScriptedConnection>) -> SqlLedger {
    let dialect = DialectRegistry::with_builtins().require("postgres").unwrap();
    SqlLedger::new(conn, dialect.engine.clone(), "schemaflow_changelog")
}

fn entry_row(identity: &str, checksum: &str, ordinal: i64) -> Vec<Value> {
    vec![
        Value::Text(identity.into()),
        Value::Text(checksum.into()),
        Value::Int(ordinal),
        Value::Timestamp(Utc::now()),
        Value::Bool(true),
    ]
}

#[tokio::test]
async fn ensure_initialized_runs_bootstrap_ddl() {
    let conn = Arc::new(ScriptedConnection::new());
    let ledger = sql_ledger(conn.clone());

    ledger.ensure_initialized().await.unwrap();

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS \"schemaflow_changelog\""));
}

#[tokio::test]
async fn load_applied_parses_rows_in_ordinal_order() {
    let conn = Arc::new(ScriptedConnection::new());
    conn.push_result(vec![entry_row("app/A", "aaa", 1), entry_row("app/B", "bbb", 2)]);
    let ledger = sql_ledger(conn.clone());

    let entries = ledger.load_applied().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].identity, "app/A");
    assert_eq!(entries[1].ordinal, 2);

    let queries = conn.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("ORDER BY ordinal"));
}

#[tokio::test]
async fn load_applied_rejects_wrong_row_arity() {
    let conn = Arc::new(ScriptedConnection::new());
    conn.push_result(vec![vec![Value::Text("app/A".into()), Value::Int(1)]]);
    let ledger = sql_ledger(conn);

    let err = ledger.load_applied().await.unwrap_err();
    assert!(matches!(err, MigrateError::LedgerCorrupt(msg) if msg.contains("expected 5")));
}

#[tokio::test]
async fn load_applied_rejects_wrong_column_type() {
    let conn = Arc::new(ScriptedConnection::new());
    let mut row = entry_row("app/A", "aaa", 1);
    row[2] = Value::Text("one".into());
    conn.push_result(vec![row]);
    let ledger = sql_ledger(conn);

    let err = ledger.load_applied().await.unwrap_err();
    assert!(matches!(err, MigrateError::LedgerCorrupt(msg) if msg.contains("ordinal")));
}

#[tokio::test]
async fn load_applied_rejects_non_increasing_ordinals() {
    let conn = Arc::new(ScriptedConnection::new());
    conn.push_result(vec![entry_row("app/A", "aaa", 2), entry_row("app/B", "bbb", 2)]);
    let ledger = sql_ledger(conn);

    let err = ledger.load_applied().await.unwrap_err();
    assert!(matches!(err, MigrateError::LedgerCorrupt(msg)
        if msg.contains("strictly increasing")));
}

#[tokio::test]
async fn record_applied_inserts_after_existence_check() {
    let conn = Arc::new(ScriptedConnection::new());
    // Existence check returns no rows.
    conn.push_result(vec![]);
    let ledger = sql_ledger(conn.clone());

    let set = ChangeSet::new(
        "app/AddWidgets",
        vec![ChangeUnit::CreateTable {
            table: Table::new("Widgets", vec![Column::new("id", TypeToken::BigInt)]),
        }],
    );
    let entry = LedgerEntry::for_applied(&set, 1);
    ledger.record_applied(&entry).await.unwrap();

    let queries = conn.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("WHERE identity = $1"));

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("INSERT INTO \"schemaflow_changelog\""));
    assert!(executed[0].contains("VALUES ($1, $2, $3, $4, $5)"));
}

#[tokio::test]
async fn record_applied_rejects_existing_identity() {
    let conn = Arc::new(ScriptedConnection::new());
    // Existence check finds a row.
    conn.push_result(vec![vec![Value::Int(1)]]);
    let ledger = sql_ledger(conn.clone());

    let entry = LedgerEntry {
        identity: "app/AddWidgets".into(),
        checksum: "abc".into(),
        ordinal: 1,
        applied_at: Utc::now(),
        success: true,
    };
    let err = ledger.record_applied(&entry).await.unwrap_err();
    assert!(matches!(err, MigrateError::DuplicateApplication { identity }
        if identity == "app/AddWidgets"));
    // Nothing inserted.
    assert!(conn.executed().is_empty());
}
