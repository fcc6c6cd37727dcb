//! Database session interface.
//!
//! The engine never speaks a wire protocol itself: driver and connection
//! plumbing for each database product is an external collaborator behind
//! the [`Connection`] trait. Implementations wrap a single session against
//! the target database; the orchestrator owns it exclusively for the
//! duration of a run, and dialect engines/introspectors receive it per
//! invocation without retaining it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Minimal scalar value for statement parameters and catalog rows.
///
/// Schema migration moves structure, not application data, so this set is
/// deliberately small: everything the ledger and the catalog queries need.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Text data.
    Text(String),
    /// Timestamp with timezone.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Borrow as text, if this is a `Text` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read as an integer, if this is an `Int` value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as a boolean, if this is a `Bool` value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as a timestamp, if this is a `Timestamp` value.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// True for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// One result row.
pub type Row = Vec<Value>;

/// A single session against the target database.
///
/// Implementations map their driver's errors into
/// [`MigrateError::Database`](crate::error::MigrateError::Database) via
/// [`MigrateError::database`](crate::error::MigrateError::database).
///
/// # Transactions
///
/// A migration run is single-threaded and statements execute strictly
/// sequentially, so the transaction methods operate on the session's one
/// in-flight transaction. `begin` while a transaction is open, or
/// `commit`/`rollback` without one, is an implementation error.
///
/// # Locking
///
/// `try_lock`/`unlock` expose the product's session-scoped mutual
/// exclusion primitive (e.g. an advisory lock keyed by name). `try_lock`
/// never blocks: it reports whether the lock was acquired.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the affected row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run a query and collect all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Begin a transaction.
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Try to acquire the named exclusive lock without blocking.
    async fn try_lock(&self, name: &str) -> Result<bool>;

    /// Release the named lock.
    async fn unlock(&self, name: &str) -> Result<()>;

    /// Product identity for dialect probing (e.g. "postgres", "mariadb").
    fn product(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Text("x".into()).as_str(), Some("x"));
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert!(Value::Null.is_null());
        assert_eq!(Value::Int(7).as_str(), None);
    }

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from("a"), Value::Text("a".into()));
        assert_eq!(Value::from(1i64), Value::Int(1));
        assert_eq!(Value::from(false), Value::Bool(false));
    }
}
