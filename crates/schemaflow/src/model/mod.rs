//! Canonical, dialect-neutral schema model.
//!
//! These types describe database structure (tables, columns, constraints,
//! indexes) independently of any SQL engine. They are pure data: the only
//! behavior is construction, invariant validation, lookup, and equality,
//! which is what the diff engine needs. Both declared change units and
//! live-catalog introspection produce this same representation.

mod types;

pub use types::{ColumnType, TypeToken};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// A whole database schema: tables keyed by case-sensitive name.
///
/// A sorted map keeps iteration order deterministic, which the diff engine
/// and drift reports rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Tables by name.
    pub tables: BTreeMap<String, Table>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Mutable lookup, for folding change units into the model.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Insert a table after validating its invariants.
    ///
    /// Fails with a `Config` error if a table with the same name already
    /// exists or the table itself is invalid.
    pub fn insert_table(&mut self, table: Table) -> Result<()> {
        table.validate()?;
        if self.tables.contains_key(&table.name) {
            return Err(MigrateError::Config(format!(
                "Table {} already exists in schema",
                table.name
            )));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True if the schema holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One table: named, with an ordered column sequence and sets of
/// constraints and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name (case-sensitive per dialect convention).
    pub name: String,

    /// Column definitions, in declaration order.
    pub columns: Vec<Column>,

    /// Table constraints. Comparison across the set is order-insensitive.
    pub constraints: Vec<Constraint>,

    /// Secondary indexes.
    pub indexes: Vec<Index>,
}

impl Table {
    /// Create a table with columns and no constraints or indexes.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            constraints: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The table's primary-key constraint, if declared.
    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
    }

    /// Validate structural invariants.
    ///
    /// - the table and every column have non-empty names
    /// - column names are unique within the table
    /// - at most one primary-key constraint
    /// - every constraint and index references only declared columns
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MigrateError::Config("Table name cannot be empty".into()));
        }

        let mut seen = BTreeSet::new();
        for col in &self.columns {
            if col.name.is_empty() {
                return Err(MigrateError::Config(format!(
                    "Table {} declares a column with an empty name",
                    self.name
                )));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(MigrateError::Config(format!(
                    "Table {} declares duplicate column {}",
                    self.name, col.name
                )));
            }
        }

        let pk_count = self
            .constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::PrimaryKey)
            .count();
        if pk_count > 1 {
            return Err(MigrateError::Config(format!(
                "Table {} declares {} primary-key constraints",
                self.name, pk_count
            )));
        }

        for constraint in &self.constraints {
            for col in &constraint.columns {
                if !seen.contains(col.as_str()) {
                    return Err(MigrateError::Config(format!(
                        "Constraint {} on table {} references undeclared column {}",
                        constraint.describe(),
                        self.name,
                        col
                    )));
                }
            }
        }

        for index in &self.indexes {
            for col in &index.columns {
                if !seen.contains(col.as_str()) {
                    return Err(MigrateError::Config(format!(
                        "Index {} on table {} references undeclared column {}",
                        index.name, self.name, col
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type.
    pub column_type: ColumnType,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Default value expression, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Column {
    /// Create a nullable column from a type token.
    pub fn new(name: impl Into<String>, token: TypeToken) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::from_token(token),
            nullable: true,
            default: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Attach a default value expression.
    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// Constraint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintKind::PrimaryKey => write!(f, "primary key"),
            ConstraintKind::Unique => write!(f, "unique"),
            ConstraintKind::ForeignKey => write!(f, "foreign key"),
            ConstraintKind::Check => write!(f, "check"),
        }
    }
}

/// Referenced table and columns of a foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    /// Referenced table name.
    pub table: String,

    /// Referenced column names, in order.
    pub columns: Vec<String>,
}

/// Table constraint metadata.
///
/// Target columns are ordered (column order is significant inside one
/// constraint); the collection of constraints on a table is a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name, if one was declared or observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Constraint kind.
    pub kind: ConstraintKind,

    /// Target columns, ordered.
    pub columns: Vec<String>,

    /// Referenced table/columns, for foreign keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignRef>,

    /// Check expression, for check constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_expr: Option<String>,
}

impl Constraint {
    /// Primary-key constraint over the given columns.
    pub fn primary_key(columns: Vec<String>) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::PrimaryKey,
            columns,
            references: None,
            check_expr: None,
        }
    }

    /// Unique constraint over the given columns.
    pub fn unique(columns: Vec<String>) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::Unique,
            columns,
            references: None,
            check_expr: None,
        }
    }

    /// Foreign-key constraint from `columns` to `references`.
    pub fn foreign_key(columns: Vec<String>, references: ForeignRef) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::ForeignKey,
            columns,
            references: Some(references),
            check_expr: None,
        }
    }

    /// Check constraint with the given expression.
    ///
    /// Check expressions reference columns free-form, so `columns` may be
    /// empty when the involved columns are not tracked.
    pub fn check(expr: impl Into<String>) -> Self {
        Self {
            name: None,
            kind: ConstraintKind::Check,
            columns: Vec::new(),
            references: None,
            check_expr: Some(expr.into()),
        }
    }

    /// Attach an explicit constraint name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Short human description used in error messages.
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} ({})", self.kind, self.columns.join(", ")),
        }
    }

    /// Canonical comparison key: kind, ordered target columns, reference,
    /// and check expression. Names are excluded so that auto-named live
    /// constraints still match their declared counterparts.
    pub fn canonical_key(&self) -> String {
        let reference = self
            .references
            .as_ref()
            .map(|r| format!("{}({})", r.table, r.columns.join(",")))
            .unwrap_or_default();
        let check = self.check_expr.as_deref().unwrap_or_default();
        format!(
            "{:?}|{}|{}|{}",
            self.kind,
            self.columns.join(","),
            reference,
            check
        )
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed column names, in order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub unique: bool,
}

impl Index {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Canonical comparison key, name excluded.
    pub fn canonical_key(&self) -> String {
        format!("{}|{}", self.columns.join(","), self.unique)
    }
}
