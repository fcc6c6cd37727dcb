//! Structural schema diff.
//!
//! Compares an expected [`Schema`] (the model implied by applied change
//! sets) against an actual one (a live introspection snapshot) and
//! produces an ordered sequence of [`Discrepancy`] records. The diff is
//! read-only: it never mutates either model, and it makes no judgement
//! about how to repair what it finds.

use serde::{Deserialize, Serialize};

use crate::model::{ColumnType, Schema, Table};

/// One structural difference between expected and actual schemas.
///
/// Columns are reported by name, never by position: a column sequence
/// difference where position would be ambiguous still identifies the
/// column unambiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Expected table absent from the live database.
    MissingTable { table: String },

    /// Live table absent from the expected model.
    ExtraTable { table: String },

    /// Expected column absent from the live table.
    MissingColumn { table: String, column: String },

    /// Live column absent from the expected table.
    ExtraColumn { table: String, column: String },

    /// Column exists on both sides with a different type or nullability.
    TypeMismatch {
        table: String,
        column: String,
        expected: ColumnType,
        expected_nullable: bool,
        actual: ColumnType,
        actual_nullable: bool,
    },

    /// Constraint or index sets differ.
    ConstraintMismatch { table: String, detail: String },
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discrepancy::MissingTable { table } => write!(f, "missing table {}", table),
            Discrepancy::ExtraTable { table } => write!(f, "extra table {}", table),
            Discrepancy::MissingColumn { table, column } => {
                write!(f, "missing column {}.{}", table, column)
            }
            Discrepancy::ExtraColumn { table, column } => {
                write!(f, "extra column {}.{}", table, column)
            }
            Discrepancy::TypeMismatch {
                table,
                column,
                expected,
                expected_nullable,
                actual,
                actual_nullable,
            } => write!(
                f,
                "type mismatch on {}.{}: expected {}{}, found {}{}",
                table,
                column,
                expected,
                if *expected_nullable { "" } else { " not null" },
                actual,
                if *actual_nullable { "" } else { " not null" },
            ),
            Discrepancy::ConstraintMismatch { table, detail } => {
                write!(f, "constraint mismatch on {}: {}", table, detail)
            }
        }
    }
}

/// Compare two schemas structurally.
///
/// Tables iterate in sorted name order, so output order is deterministic.
/// A table that is missing or extra produces exactly one discrepancy; its
/// columns and constraints are not additionally reported. Constraint and
/// index comparison is order-insensitive across the set but respects
/// column order within a single constraint.
pub fn diff(expected: &Schema, actual: &Schema) -> Vec<Discrepancy> {
    let mut out = Vec::new();

    for (name, expected_table) in &expected.tables {
        match actual.table(name) {
            None => out.push(Discrepancy::MissingTable {
                table: name.clone(),
            }),
            Some(actual_table) => diff_table(expected_table, actual_table, &mut out),
        }
    }

    for name in actual.tables.keys() {
        if expected.table(name).is_none() {
            out.push(Discrepancy::ExtraTable {
                table: name.clone(),
            });
        }
    }

    out
}

fn diff_table(expected: &Table, actual: &Table, out: &mut Vec<Discrepancy>) {
    for column in &expected.columns {
        match actual.column(&column.name) {
            None => out.push(Discrepancy::MissingColumn {
                table: expected.name.clone(),
                column: column.name.clone(),
            }),
            Some(actual_column) => {
                let type_differs = !column.column_type.equivalent(&actual_column.column_type);
                if type_differs || column.nullable != actual_column.nullable {
                    out.push(Discrepancy::TypeMismatch {
                        table: expected.name.clone(),
                        column: column.name.clone(),
                        expected: column.column_type.clone(),
                        expected_nullable: column.nullable,
                        actual: actual_column.column_type.clone(),
                        actual_nullable: actual_column.nullable,
                    });
                }
            }
        }
    }

    for column in &actual.columns {
        if expected.column(&column.name).is_none() {
            out.push(Discrepancy::ExtraColumn {
                table: expected.name.clone(),
                column: column.name.clone(),
            });
        }
    }

    diff_constraints(expected, actual, out);
    diff_indexes(expected, actual, out);
}

fn diff_constraints(expected: &Table, actual: &Table, out: &mut Vec<Discrepancy>) {
    let expected_keys: Vec<(String, String)> = expected
        .constraints
        .iter()
        .map(|c| (c.canonical_key(), c.describe()))
        .collect();
    let actual_keys: Vec<(String, String)> = actual
        .constraints
        .iter()
        .map(|c| (c.canonical_key(), c.describe()))
        .collect();

    for (key, describe) in &expected_keys {
        if !actual_keys.iter().any(|(k, _)| k == key) {
            out.push(Discrepancy::ConstraintMismatch {
                table: expected.name.clone(),
                detail: format!("expected constraint {} not found", describe),
            });
        }
    }
    for (key, describe) in &actual_keys {
        if !expected_keys.iter().any(|(k, _)| k == key) {
            out.push(Discrepancy::ConstraintMismatch {
                table: expected.name.clone(),
                detail: format!("unexpected constraint {}", describe),
            });
        }
    }
}

fn diff_indexes(expected: &Table, actual: &Table, out: &mut Vec<Discrepancy>) {
    for index in &expected.indexes {
        let key = index.canonical_key();
        if !actual.indexes.iter().any(|i| i.canonical_key() == key) {
            out.push(Discrepancy::ConstraintMismatch {
                table: expected.name.clone(),
                detail: format!("expected index {} not found", index.name),
            });
        }
    }
    for index in &actual.indexes {
        let key = index.canonical_key();
        if !expected.indexes.iter().any(|i| i.canonical_key() == key) {
            out.push(Discrepancy::ConstraintMismatch {
                table: expected.name.clone(),
                detail: format!("unexpected index {}", index.name),
            });
        }
    }
}
