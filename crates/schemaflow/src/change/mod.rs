//! Change units and change sets.
//!
//! A [`ChangeUnit`] is one atomic schema mutation; a [`ChangeSet`] is an
//! identified, checksummed, ordered group of units and is the unit of
//! apply/record. Change sets are immutable once constructed: the checksum
//! is computed over the canonical JSON serialization of the units at
//! construction time and changes if and only if the authored content does.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MigrateError, Result};
use crate::model::{Column, Constraint, Index, Schema, Table};

/// One atomic schema mutation.
///
/// Each variant carries the minimal data to apply that operation. The serde
/// representation is tagged by operation kind, which makes the checksum
/// input self-describing and stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeUnit {
    /// Create a table with its full definition.
    CreateTable { table: Table },

    /// Drop an existing table.
    DropTable { table: String },

    /// Add a column to an existing table.
    AddColumn { table: String, column: Column },

    /// Drop a column from an existing table.
    DropColumn { table: String, column: String },

    /// Add a table constraint.
    AddConstraint {
        table: String,
        constraint: Constraint,
    },

    /// Drop a named table constraint.
    DropConstraint { table: String, name: String },

    /// Create a secondary index.
    CreateIndex { table: String, index: Index },

    /// Drop a secondary index.
    DropIndex { table: String, name: String },

    /// Rename a table.
    RenameTable { from: String, to: String },

    /// Raw SQL escape hatch. Executed verbatim by every dialect.
    RawSql { sql: String },
}

impl ChangeUnit {
    /// Stable operation name, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeUnit::CreateTable { .. } => "create_table",
            ChangeUnit::DropTable { .. } => "drop_table",
            ChangeUnit::AddColumn { .. } => "add_column",
            ChangeUnit::DropColumn { .. } => "drop_column",
            ChangeUnit::AddConstraint { .. } => "add_constraint",
            ChangeUnit::DropConstraint { .. } => "drop_constraint",
            ChangeUnit::CreateIndex { .. } => "create_index",
            ChangeUnit::DropIndex { .. } => "drop_index",
            ChangeUnit::RenameTable { .. } => "rename_table",
            ChangeUnit::RawSql { .. } => "raw_sql",
        }
    }

    /// Validate invariants that hold within this unit alone.
    ///
    /// Cross-set consistency (e.g. adding a column to a table created by an
    /// earlier change set) is a property of the whole plan and is checked
    /// when folding units into a schema model, not here.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ChangeUnit::CreateTable { table } => {
                table.validate().map_err(|e| e.to_string())
            }
            ChangeUnit::DropTable { table } if table.is_empty() => {
                Err("drop_table with empty table name".into())
            }
            ChangeUnit::AddColumn { table, column } => {
                if table.is_empty() {
                    return Err("add_column with empty table name".into());
                }
                if column.name.is_empty() {
                    return Err(format!("add_column on {} with empty column name", table));
                }
                Ok(())
            }
            ChangeUnit::DropColumn { table, column } => {
                if table.is_empty() || column.is_empty() {
                    return Err("drop_column requires table and column names".into());
                }
                Ok(())
            }
            ChangeUnit::AddConstraint { table, constraint } => {
                if table.is_empty() {
                    return Err("add_constraint with empty table name".into());
                }
                if constraint.columns.is_empty() && constraint.check_expr.is_none() {
                    return Err(format!(
                        "add_constraint {} on {} targets no columns",
                        constraint.describe(),
                        table
                    ));
                }
                Ok(())
            }
            ChangeUnit::DropConstraint { table, name }
            | ChangeUnit::DropIndex { table, name } => {
                if table.is_empty() || name.is_empty() {
                    return Err(format!("{} requires table and object names", self.kind()));
                }
                Ok(())
            }
            ChangeUnit::CreateIndex { table, index } => {
                if table.is_empty() {
                    return Err("create_index with empty table name".into());
                }
                if index.name.is_empty() || index.columns.is_empty() {
                    return Err(format!(
                        "create_index on {} requires a name and at least one column",
                        table
                    ));
                }
                Ok(())
            }
            ChangeUnit::RenameTable { from, to } => {
                if from.is_empty() || to.is_empty() {
                    return Err("rename_table requires both names".into());
                }
                Ok(())
            }
            ChangeUnit::RawSql { sql } => {
                if sql.trim().is_empty() {
                    return Err("raw_sql with empty statement".into());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Fold this unit into a schema model.
    ///
    /// Used to build the expected model implied by applied change sets for
    /// drift reports. Raw SQL units are opaque to the model and skipped.
    pub fn apply_to(&self, schema: &mut Schema) -> Result<()> {
        match self {
            ChangeUnit::CreateTable { table } => schema.insert_table(table.clone()),
            ChangeUnit::DropTable { table } => {
                schema.tables.remove(table).ok_or_else(|| {
                    MigrateError::Config(format!("drop_table: no such table {}", table))
                })?;
                Ok(())
            }
            ChangeUnit::AddColumn { table, column } => {
                let t = require_table(schema, table, self.kind())?;
                if t.column(&column.name).is_some() {
                    return Err(MigrateError::Config(format!(
                        "add_column: column {} already exists on {}",
                        column.name, table
                    )));
                }
                t.columns.push(column.clone());
                Ok(())
            }
            ChangeUnit::DropColumn { table, column } => {
                let t = require_table(schema, table, self.kind())?;
                let before = t.columns.len();
                t.columns.retain(|c| &c.name != column);
                if t.columns.len() == before {
                    return Err(MigrateError::Config(format!(
                        "drop_column: no column {} on {}",
                        column, table
                    )));
                }
                Ok(())
            }
            ChangeUnit::AddConstraint { table, constraint } => {
                let t = require_table(schema, table, self.kind())?;
                t.constraints.push(constraint.clone());
                t.validate()
            }
            ChangeUnit::DropConstraint { table, name } => {
                let t = require_table(schema, table, self.kind())?;
                let before = t.constraints.len();
                t.constraints.retain(|c| c.name.as_deref() != Some(name));
                if t.constraints.len() == before {
                    return Err(MigrateError::Config(format!(
                        "drop_constraint: no constraint {} on {}",
                        name, table
                    )));
                }
                Ok(())
            }
            ChangeUnit::CreateIndex { table, index } => {
                let t = require_table(schema, table, self.kind())?;
                t.indexes.push(index.clone());
                t.validate()
            }
            ChangeUnit::DropIndex { table, name } => {
                let t = require_table(schema, table, self.kind())?;
                let before = t.indexes.len();
                t.indexes.retain(|i| &i.name != name);
                if t.indexes.len() == before {
                    return Err(MigrateError::Config(format!(
                        "drop_index: no index {} on {}",
                        name, table
                    )));
                }
                Ok(())
            }
            ChangeUnit::RenameTable { from, to } => {
                let mut t = schema.tables.remove(from).ok_or_else(|| {
                    MigrateError::Config(format!("rename_table: no such table {}", from))
                })?;
                t.name = to.clone();
                schema.insert_table(t)
            }
            // Opaque to the structural model.
            ChangeUnit::RawSql { .. } => Ok(()),
        }
    }
}

fn require_table<'a>(
    schema: &'a mut Schema,
    name: &str,
    op: &'static str,
) -> Result<&'a mut Table> {
    schema
        .table_mut(name)
        .ok_or_else(|| MigrateError::Config(format!("{}: no such table {}", op, name)))
}

/// An identified, checksummed, ordered group of change units.
///
/// Identity derives from the definition's source location within the
/// discovery hierarchy (e.g. `"app/billing/AddInvoiceTable"`) and is
/// globally unique within one discovery run. Instances are immutable:
/// all fields are private and set once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    identity: String,
    units: Vec<ChangeUnit>,
    checksum: String,
}

impl ChangeSet {
    /// Construct a change set, computing the content checksum.
    pub fn new(identity: impl Into<String>, units: Vec<ChangeUnit>) -> Self {
        let checksum = checksum_units(&units);
        Self {
            identity: identity.into(),
            units,
            checksum,
        }
    }

    /// Source-derived identity, unique within a discovery run.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The ordered change units.
    pub fn units(&self) -> &[ChangeUnit] {
        &self.units
    }

    /// Hex-encoded SHA-256 over the canonical serialization of the units.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// Deterministic content hash over the serialized units.
fn checksum_units(units: &[ChangeUnit]) -> String {
    let mut hasher = Sha256::new();
    for unit in units {
        // serde_json over a tagged enum with ordered struct fields is
        // deterministic for a given unit value.
        let json = serde_json::to_string(unit).unwrap_or_default();
        hasher.update(json.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Fold every unit of every change set, in order, into an empty schema.
///
/// This is the model a database is expected to have after the given sets
/// ran; the drift report diffs it against a live snapshot.
pub fn build_expected_schema(sets: &[ChangeSet]) -> Result<Schema> {
    let mut schema = Schema::new();
    for set in sets {
        for unit in set.units() {
            unit.apply_to(&mut schema).map_err(|e| {
                MigrateError::MalformedDefinition {
                    identity: set.identity().to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintKind, TypeToken};

    fn widgets_unit() -> ChangeUnit {
        let mut table = Table::new(
            "Widgets",
            vec![
                Column::new("id", TypeToken::BigInt).not_null(),
                Column::new("name", TypeToken::Varchar(255)),
            ],
        );
        table
            .constraints
            .push(Constraint::primary_key(vec!["id".into()]));
        ChangeUnit::CreateTable { table }
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = ChangeSet::new("app/AddWidgets", vec![widgets_unit()]);
        let b = ChangeSet::new("app/AddWidgets", vec![widgets_unit()]);
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let a = ChangeSet::new("app/AddWidgets", vec![widgets_unit()]);
        let b = ChangeSet::new(
            "app/AddWidgets",
            vec![
                widgets_unit(),
                ChangeUnit::AddColumn {
                    table: "Widgets".into(),
                    column: Column::new("price", TypeToken::Integer),
                },
            ],
        );
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_ignores_identity() {
        let a = ChangeSet::new("app/A", vec![widgets_unit()]);
        let b = ChangeSet::new("app/B", vec![widgets_unit()]);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_unit_order_changes_checksum() {
        let add = ChangeUnit::AddColumn {
            table: "Widgets".into(),
            column: Column::new("price", TypeToken::Integer),
        };
        let drop = ChangeUnit::DropColumn {
            table: "Widgets".into(),
            column: "name".into(),
        };
        let a = ChangeSet::new("x", vec![add.clone(), drop.clone()]);
        let b = ChangeSet::new("x", vec![drop, add]);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_validate_rejects_constraint_on_undeclared_column() {
        let mut table = Table::new("t", vec![Column::new("a", TypeToken::Integer)]);
        table
            .constraints
            .push(Constraint::unique(vec!["missing".into()]));
        let unit = ChangeUnit::CreateTable { table };
        assert!(unit.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_raw_sql() {
        let unit = ChangeUnit::RawSql { sql: "   ".into() };
        assert!(unit.validate().is_err());
    }

    #[test]
    fn test_apply_create_then_add_column() {
        let mut schema = Schema::new();
        widgets_unit().apply_to(&mut schema).unwrap();
        ChangeUnit::AddColumn {
            table: "Widgets".into(),
            column: Column::new("price", TypeToken::Integer),
        }
        .apply_to(&mut schema)
        .unwrap();

        let table = schema.table("Widgets").unwrap();
        assert_eq!(table.columns.len(), 3);
        assert!(table.column("price").is_some());
    }

    #[test]
    fn test_apply_add_column_to_missing_table_fails() {
        let mut schema = Schema::new();
        let err = ChangeUnit::AddColumn {
            table: "Nope".into(),
            column: Column::new("x", TypeToken::Integer),
        }
        .apply_to(&mut schema)
        .unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_apply_rename_table() {
        let mut schema = Schema::new();
        widgets_unit().apply_to(&mut schema).unwrap();
        ChangeUnit::RenameTable {
            from: "Widgets".into(),
            to: "Gadgets".into(),
        }
        .apply_to(&mut schema)
        .unwrap();
        assert!(schema.table("Widgets").is_none());
        assert_eq!(schema.table("Gadgets").unwrap().name, "Gadgets");
    }

    #[test]
    fn test_build_expected_schema_across_sets() {
        let sets = vec![
            ChangeSet::new("app/AddWidgets", vec![widgets_unit()]),
            ChangeSet::new(
                "app/AddPrice",
                vec![ChangeUnit::AddColumn {
                    table: "Widgets".into(),
                    column: Column::new("price", TypeToken::Integer),
                }],
            ),
        ];
        let schema = build_expected_schema(&sets).unwrap();
        let table = schema.table("Widgets").unwrap();
        assert!(table.column("price").is_some());
        assert_eq!(
            table.primary_key().unwrap().kind,
            ConstraintKind::PrimaryKey
        );
    }

    #[test]
    fn test_build_expected_schema_reports_offending_identity() {
        let sets = vec![ChangeSet::new(
            "app/Broken",
            vec![ChangeUnit::DropTable {
                table: "Ghost".into(),
            }],
        )];
        let err = build_expected_schema(&sets).unwrap_err();
        assert!(err.to_string().contains("app/Broken"));
    }
}
