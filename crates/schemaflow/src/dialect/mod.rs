//! Dialect abstraction and registry.
//!
//! A [`Dialect`] is a named capability bundle for one database product: a
//! [`MigrateEngine`] that translates change units into executable DDL, and
//! an [`IntrospectorBuilder`] that reads the live catalog back into the
//! canonical schema model. Exactly one dialect is active per migration
//! run, selected from a [`DialectRegistry`] by name or by probing the
//! connection's product identity.
//!
//! Dialects are stateless: engines and introspector builders hold no
//! connection and no per-run state, so one registration serves every run.

mod ident;
pub mod postgres;

pub use ident::{quote_double, validate_identifier};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::change::ChangeUnit;
use crate::connection::Connection;
use crate::error::{MigrateError, Result};
use crate::model::Schema;

/// Translates change units into executable statements for one product.
///
/// Translation must be deterministic: re-translating the same unit always
/// yields byte-identical statements. Execution idempotence is the
/// orchestrator's responsibility via the ledger, never the engine's.
pub trait MigrateEngine: Send + Sync {
    /// The dialect this engine belongs to.
    fn dialect_name(&self) -> &'static str;

    /// Translate one change unit into an ordered statement sequence.
    ///
    /// Total over every unit kind the dialect supports; fails with
    /// [`MigrateError::UnsupportedOperation`] naming the unit kind
    /// otherwise.
    fn translate(&self, unit: &ChangeUnit) -> Result<Vec<String>>;

    /// DDL that bootstraps the ledger bookkeeping table.
    ///
    /// Creating this table is a privileged, dialect-specific operation
    /// performed once per target database; statements must be idempotent
    /// (`IF NOT EXISTS` or the product's equivalent).
    fn ledger_table_ddl(&self, table: &str) -> Result<Vec<String>>;

    /// Quote an identifier for interpolation into a statement.
    ///
    /// The default is ANSI double quoting with embedded-quote doubling.
    fn quote_ident(&self, name: &str) -> Result<String> {
        ident::quote_double(name)
    }

    /// Parameter placeholder for the given 1-based index.
    ///
    /// The default is the `$1`, `$2`, ... convention.
    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

/// Reads the live catalog into a [`Schema`] snapshot.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Build a schema model of the live database.
    async fn snapshot(&self) -> Result<Schema>;
}

/// Builds an [`Introspector`] bound to a connection.
pub trait IntrospectorBuilder: Send + Sync {
    /// Bind an introspector to the given session.
    fn build(&self, conn: Arc<dyn Connection>) -> Box<dyn Introspector>;
}

/// Named capability bundle for one database product.
#[derive(Clone)]
pub struct Dialect {
    /// Unique dialect key (e.g. "postgres", "mariadb").
    pub name: &'static str,

    /// Whether the product supports transactional DDL. When false, a
    /// failure mid-change-set can leave a documented partial state.
    pub transactional_ddl: bool,

    /// Statement generator.
    pub engine: Arc<dyn MigrateEngine>,

    /// Catalog reader factory.
    pub introspector: Arc<dyn IntrospectorBuilder>,
}

impl std::fmt::Debug for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("transactional_ddl", &self.transactional_ddl)
            .finish()
    }
}

/// Registry of dialects, keyed by name.
///
/// Explicitly constructed and injected into the orchestrator rather than
/// being global state: deterministic initialization and easy mock
/// registration in tests.
#[derive(Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<Dialect>>,
}

impl DialectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in dialects registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(postgres::dialect());
        registry
    }

    /// Register a dialect under its own name.
    pub fn register(&mut self, dialect: Dialect) {
        self.dialects
            .insert(dialect.name.to_string(), Arc::new(dialect));
    }

    /// Get a dialect by name.
    pub fn get(&self, name: &str) -> Option<Arc<Dialect>> {
        self.dialects.get(name).cloned()
    }

    /// Get a dialect by name, failing with `UnknownDialect` if absent.
    pub fn require(&self, name: &str) -> Result<Arc<Dialect>> {
        self.get(name)
            .ok_or_else(|| MigrateError::UnknownDialect(name.to_string()))
    }

    /// Select a dialect by probing a connection's product identity.
    ///
    /// The product string matches a dialect if it equals the dialect name
    /// or starts with it (case-insensitive), so "postgres 16.2" selects
    /// "postgres".
    pub fn select_for_product(&self, product: &str) -> Result<Arc<Dialect>> {
        let lowered = product.to_lowercase();
        let mut names: Vec<&String> = self.dialects.keys().collect();
        // Longest name first so "mariadb" wins over a hypothetical "maria".
        names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        for name in names {
            if lowered == *name || lowered.starts_with(name.as_str()) {
                return self.require(name);
            }
        }
        Err(MigrateError::UnknownDialect(product.to_string()))
    }

    /// All registered dialect names, sorted.
    pub fn dialect_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectRegistry")
            .field("dialects", &self.dialect_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEngine;

    impl MigrateEngine for NullEngine {
        fn dialect_name(&self) -> &'static str {
            "null"
        }

        fn translate(&self, unit: &ChangeUnit) -> Result<Vec<String>> {
            Err(MigrateError::UnsupportedOperation {
                dialect: "null".into(),
                operation: unit.kind(),
            })
        }

        fn ledger_table_ddl(&self, _table: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    struct NullBuilder;

    impl IntrospectorBuilder for NullBuilder {
        fn build(&self, _conn: Arc<dyn Connection>) -> Box<dyn Introspector> {
            unimplemented!("not used in registry tests")
        }
    }

    fn null_dialect(name: &'static str) -> Dialect {
        Dialect {
            name,
            transactional_ddl: false,
            engine: Arc::new(NullEngine),
            introspector: Arc::new(NullBuilder),
        }
    }

    #[test]
    fn test_register_and_require() {
        let mut registry = DialectRegistry::new();
        assert!(registry.require("h2").is_err());

        registry.register(null_dialect("h2"));
        assert_eq!(registry.require("h2").unwrap().name, "h2");
    }

    #[test]
    fn test_unknown_dialect_error_names_requested_key() {
        let registry = DialectRegistry::new();
        let err = registry.require("oracle").unwrap_err();
        assert!(matches!(err, MigrateError::UnknownDialect(name) if name == "oracle"));
    }

    #[test]
    fn test_select_for_product_prefix_match() {
        let mut registry = DialectRegistry::new();
        registry.register(null_dialect("postgres"));
        registry.register(null_dialect("mariadb"));

        assert_eq!(
            registry.select_for_product("PostgreSQL 16.2").unwrap().name,
            "postgres"
        );
        assert_eq!(
            registry.select_for_product("mariadb").unwrap().name,
            "mariadb"
        );
        assert!(registry.select_for_product("sqlite").is_err());
    }

    #[test]
    fn test_builtin_registry_has_postgres() {
        let registry = DialectRegistry::with_builtins();
        assert_eq!(registry.dialect_names(), vec!["postgres"]);
        assert!(registry.require("postgres").unwrap().transactional_ddl);
    }
}
