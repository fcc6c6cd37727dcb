//! PostgreSQL dialect: DDL generation and catalog introspection.
//!
//! This is the built-in dialect of the core. Statement generation is a
//! pure function of the change unit, so re-translation always yields
//! byte-identical statements. Introspection reads `information_schema`
//! and `pg_catalog` through the session [`Connection`] and normalizes
//! native type names into the canonical tokens via the fixed mapping
//! table in [`normalize_type`]; native types outside the table keep
//! their raw spelling and are flagged approximate.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::change::ChangeUnit;
use crate::connection::{Connection, Row, Value};
use crate::error::{MigrateError, Result};
use crate::model::{
    Column, ColumnType, Constraint, ConstraintKind, ForeignRef, Index, Schema, Table, TypeToken,
};

use super::ident::quote_double;
use super::{Dialect, Introspector, IntrospectorBuilder, MigrateEngine};

/// Build the postgres dialect bundle.
pub fn dialect() -> Dialect {
    Dialect {
        name: "postgres",
        transactional_ddl: true,
        engine: Arc::new(PostgresEngine),
        introspector: Arc::new(PostgresIntrospectorBuilder),
    }
}

/// PostgreSQL statement generator.
#[derive(Debug, Clone, Default)]
pub struct PostgresEngine;

impl MigrateEngine for PostgresEngine {
    fn dialect_name(&self) -> &'static str {
        "postgres"
    }

    fn translate(&self, unit: &ChangeUnit) -> Result<Vec<String>> {
        match unit {
            ChangeUnit::CreateTable { table } => create_table(table),
            ChangeUnit::DropTable { table } => {
                Ok(vec![format!("DROP TABLE {}", quote_double(table)?)])
            }
            ChangeUnit::AddColumn { table, column } => Ok(vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_double(table)?,
                render_column(column)?
            )]),
            ChangeUnit::DropColumn { table, column } => Ok(vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_double(table)?,
                quote_double(column)?
            )]),
            ChangeUnit::AddConstraint { table, constraint } => Ok(vec![format!(
                "ALTER TABLE {} ADD {}",
                quote_double(table)?,
                render_constraint(constraint)?
            )]),
            ChangeUnit::DropConstraint { table, name } => Ok(vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                quote_double(table)?,
                quote_double(name)?
            )]),
            ChangeUnit::CreateIndex { table, index } => {
                Ok(vec![create_index(table, index)?])
            }
            ChangeUnit::DropIndex { name, .. } => {
                Ok(vec![format!("DROP INDEX {}", quote_double(name)?)])
            }
            ChangeUnit::RenameTable { from, to } => Ok(vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_double(from)?,
                quote_double(to)?
            )]),
            ChangeUnit::RawSql { sql } => Ok(vec![sql.clone()]),
        }
    }

    fn ledger_table_ddl(&self, table: &str) -> Result<Vec<String>> {
        Ok(vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  \
             identity text PRIMARY KEY,\n  \
             checksum text NOT NULL,\n  \
             ordinal bigint NOT NULL UNIQUE,\n  \
             applied_at timestamptz NOT NULL,\n  \
             success boolean NOT NULL\n)",
            quote_double(table)?
        )])
    }
}

fn create_table(table: &Table) -> Result<Vec<String>> {
    table.validate()?;

    let mut parts: Vec<String> = Vec::new();
    for column in &table.columns {
        parts.push(format!("  {}", render_column(column)?));
    }
    for constraint in &table.constraints {
        parts.push(format!("  {}", render_constraint(constraint)?));
    }

    let mut statements = vec![format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_double(&table.name)?,
        parts.join(",\n")
    )];

    for index in &table.indexes {
        statements.push(create_index(&table.name, index)?);
    }

    Ok(statements)
}

fn create_index(table: &str, index: &Index) -> Result<String> {
    let columns = index
        .columns
        .iter()
        .map(|c| quote_double(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let unique = if index.unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_double(&index.name)?,
        quote_double(table)?,
        columns
    ))
}

fn render_column(column: &Column) -> Result<String> {
    let mut sql = format!(
        "{} {}",
        quote_double(&column.name)?,
        render_type(&column.column_type)?
    );
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", default));
    }
    Ok(sql)
}

fn render_constraint(constraint: &Constraint) -> Result<String> {
    let columns = constraint
        .columns
        .iter()
        .map(|c| quote_double(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let body = match constraint.kind {
        ConstraintKind::PrimaryKey => format!("PRIMARY KEY ({})", columns),
        ConstraintKind::Unique => format!("UNIQUE ({})", columns),
        ConstraintKind::ForeignKey => {
            let reference = constraint.references.as_ref().ok_or_else(|| {
                MigrateError::Config(format!(
                    "Foreign-key constraint {} has no referenced table",
                    constraint.describe()
                ))
            })?;
            let ref_columns = reference
                .columns
                .iter()
                .map(|c| quote_double(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                columns,
                quote_double(&reference.table)?,
                ref_columns
            )
        }
        ConstraintKind::Check => {
            let expr = constraint.check_expr.as_deref().ok_or_else(|| {
                MigrateError::Config(format!(
                    "Check constraint {} has no expression",
                    constraint.describe()
                ))
            })?;
            format!("CHECK ({})", expr)
        }
    };

    match &constraint.name {
        Some(name) => Ok(format!("CONSTRAINT {} {}", quote_double(name)?, body)),
        None => Ok(body),
    }
}

/// Render a canonical type token as PostgreSQL DDL.
fn render_type(ty: &ColumnType) -> Result<String> {
    let sql = match &ty.token {
        TypeToken::Boolean => "boolean".to_string(),
        TypeToken::SmallInt => "smallint".to_string(),
        TypeToken::Integer => "integer".to_string(),
        TypeToken::BigInt => "bigint".to_string(),
        TypeToken::Real => "real".to_string(),
        TypeToken::Double => "double precision".to_string(),
        TypeToken::Decimal { precision: 0, .. } => "numeric".to_string(),
        TypeToken::Decimal { precision, scale } => format!("numeric({},{})", precision, scale),
        TypeToken::Char(0) => "char".to_string(),
        TypeToken::Char(n) => format!("char({})", n),
        TypeToken::Varchar(0) => "varchar".to_string(),
        TypeToken::Varchar(n) => format!("varchar({})", n),
        TypeToken::Text => "text".to_string(),
        TypeToken::Binary(_) | TypeToken::Varbinary(_) | TypeToken::Blob => "bytea".to_string(),
        TypeToken::Date => "date".to_string(),
        TypeToken::Time => "time".to_string(),
        TypeToken::Timestamp => "timestamp".to_string(),
        TypeToken::TimestampTz => "timestamptz".to_string(),
        TypeToken::Uuid => "uuid".to_string(),
        TypeToken::Json => "jsonb".to_string(),
        // Carried through verbatim; introspection preserved the native
        // spelling in the raw field.
        TypeToken::Unknown => {
            if ty.raw.is_empty() {
                return Err(MigrateError::Config(
                    "Cannot render a column type with no token and no raw type".into(),
                ));
            }
            ty.raw.clone()
        }
    };
    Ok(sql)
}

/// Normalize a native catalog type name into a canonical token.
///
/// The mapping table is fixed per dialect; names outside it produce an
/// approximate [`ColumnType`] carrying the native spelling verbatim.
fn normalize_type(data_type: &str, max_length: Option<i64>, precision: Option<i64>, scale: Option<i64>) -> ColumnType {
    let lowered = data_type.to_lowercase();
    let token = match lowered.as_str() {
        "boolean" | "bool" => Some(TypeToken::Boolean),
        "smallint" | "int2" => Some(TypeToken::SmallInt),
        "integer" | "int" | "int4" => Some(TypeToken::Integer),
        "bigint" | "int8" => Some(TypeToken::BigInt),
        "real" | "float4" => Some(TypeToken::Real),
        "double precision" | "float8" => Some(TypeToken::Double),
        "numeric" | "decimal" => Some(TypeToken::Decimal {
            precision: precision.unwrap_or(0).clamp(0, u8::MAX as i64) as u8,
            scale: scale.unwrap_or(0).clamp(0, u8::MAX as i64) as u8,
        }),
        "character varying" | "varchar" => {
            Some(TypeToken::Varchar(max_length.unwrap_or(0).max(0) as u32))
        }
        "character" | "char" | "bpchar" => {
            Some(TypeToken::Char(max_length.unwrap_or(1).max(0) as u32))
        }
        "text" => Some(TypeToken::Text),
        "bytea" => Some(TypeToken::Blob),
        "date" => Some(TypeToken::Date),
        "time" | "time without time zone" => Some(TypeToken::Time),
        "timestamp" | "timestamp without time zone" => Some(TypeToken::Timestamp),
        "timestamptz" | "timestamp with time zone" => Some(TypeToken::TimestampTz),
        "uuid" => Some(TypeToken::Uuid),
        "json" | "jsonb" => Some(TypeToken::Json),
        _ => None,
    };

    match token {
        Some(token) => ColumnType {
            token,
            raw: lowered,
            approximate: false,
        },
        None => ColumnType::approximate(lowered),
    }
}

/// Builds [`PostgresIntrospector`]s.
pub struct PostgresIntrospectorBuilder;

impl IntrospectorBuilder for PostgresIntrospectorBuilder {
    fn build(&self, conn: Arc<dyn Connection>) -> Box<dyn Introspector> {
        Box::new(PostgresIntrospector { conn })
    }
}

const COLUMNS_QUERY: &str = "\
SELECT c.table_name, c.column_name, c.data_type, c.character_maximum_length, \
c.numeric_precision, c.numeric_scale, c.is_nullable, c.column_default \
FROM information_schema.columns c \
JOIN information_schema.tables t \
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE' \
ORDER BY c.table_name, c.ordinal_position";

const CONSTRAINTS_QUERY: &str = "\
SELECT tc.table_name, tc.constraint_name, tc.constraint_type, kcu.column_name, \
ccu.table_name AS referenced_table, ccu.column_name AS referenced_column, cc.check_clause \
FROM information_schema.table_constraints tc \
LEFT JOIN information_schema.key_column_usage kcu \
  ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
LEFT JOIN information_schema.constraint_column_usage ccu \
  ON ccu.constraint_schema = tc.constraint_schema AND ccu.constraint_name = tc.constraint_name \
  AND tc.constraint_type = 'FOREIGN KEY' \
LEFT JOIN information_schema.check_constraints cc \
  ON cc.constraint_schema = tc.constraint_schema AND cc.constraint_name = tc.constraint_name \
WHERE tc.table_schema = current_schema() \
  AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY', 'CHECK') \
ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position";

const INDEXES_QUERY: &str = "\
SELECT t.relname AS table_name, i.relname AS index_name, a.attname AS column_name, \
ix.indisunique \
FROM pg_catalog.pg_index ix \
JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
WHERE n.nspname = current_schema() AND NOT ix.indisprimary \
  AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint c WHERE c.conindid = ix.indexrelid) \
ORDER BY t.relname, i.relname, array_position(ix.indkey, a.attnum)";

/// Reads the live PostgreSQL catalog into a [`Schema`].
pub struct PostgresIntrospector {
    conn: Arc<dyn Connection>,
}

#[async_trait]
impl Introspector for PostgresIntrospector {
    async fn snapshot(&self) -> Result<Schema> {
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();

        for row in self.conn.query(COLUMNS_QUERY, &[]).await? {
            let table_name = text_at(&row, 0, "columns.table_name")?;
            let column = column_from_row(&row)?;
            tables
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name, Vec::new()))
                .columns
                .push(column);
        }

        for (table_name, constraint) in
            group_constraints(self.conn.query(CONSTRAINTS_QUERY, &[]).await?)?
        {
            if let Some(table) = tables.get_mut(&table_name) {
                table.constraints.push(constraint);
            }
        }

        for (table_name, index) in group_indexes(self.conn.query(INDEXES_QUERY, &[]).await?)? {
            if let Some(table) = tables.get_mut(&table_name) {
                table.indexes.push(index);
            }
        }

        let mut schema = Schema::new();
        schema.tables = tables;
        Ok(schema)
    }
}

fn column_from_row(row: &Row) -> Result<Column> {
    let name = text_at(row, 1, "columns.column_name")?;
    let data_type = text_at(row, 2, "columns.data_type")?;
    let max_length = row.get(3).and_then(Value::as_i64);
    let precision = row.get(4).and_then(Value::as_i64);
    let scale = row.get(5).and_then(Value::as_i64);
    let nullable = text_at(row, 6, "columns.is_nullable")? == "YES";
    let default = row.get(7).and_then(Value::as_str).map(str::to_string);

    Ok(Column {
        name,
        column_type: normalize_type(&data_type, max_length, precision, scale),
        nullable,
        default,
    })
}

/// Collapse per-column constraint rows into one constraint per name.
fn group_constraints(rows: Vec<Row>) -> Result<Vec<(String, Constraint)>> {
    let mut out: Vec<(String, Constraint)> = Vec::new();
    let mut current: Option<(String, String, Constraint)> = None;

    for row in rows {
        let table = text_at(&row, 0, "constraints.table_name")?;
        let name = text_at(&row, 1, "constraints.constraint_name")?;
        let kind = match text_at(&row, 2, "constraints.constraint_type")?.as_str() {
            "PRIMARY KEY" => ConstraintKind::PrimaryKey,
            "UNIQUE" => ConstraintKind::Unique,
            "FOREIGN KEY" => ConstraintKind::ForeignKey,
            "CHECK" => ConstraintKind::Check,
            other => {
                return Err(MigrateError::Database(
                    format!("unexpected constraint type in catalog: {}", other).into(),
                ))
            }
        };
        let column = row.get(3).and_then(Value::as_str).map(str::to_string);
        let ref_table = row.get(4).and_then(Value::as_str).map(str::to_string);
        let ref_column = row.get(5).and_then(Value::as_str).map(str::to_string);
        let check_clause = row.get(6).and_then(Value::as_str).map(str::to_string);

        let same_group = matches!(
            &current,
            Some((t, n, _)) if *t == table && *n == name
        );
        if !same_group {
            if let Some((t, _, c)) = current.take() {
                out.push((t, c));
            }
            let mut constraint = Constraint {
                name: Some(name.clone()),
                kind,
                columns: Vec::new(),
                references: None,
                check_expr: check_clause,
            };
            if kind == ConstraintKind::ForeignKey {
                if let Some(ref_table) = ref_table.clone() {
                    constraint.references = Some(ForeignRef {
                        table: ref_table,
                        columns: Vec::new(),
                    });
                }
            }
            current = Some((table, name, constraint));
        }

        if let Some((_, _, constraint)) = &mut current {
            if let Some(column) = column {
                constraint.columns.push(column);
            }
            if let (Some(reference), Some(ref_column)) =
                (constraint.references.as_mut(), ref_column)
            {
                reference.columns.push(ref_column);
            }
        }
    }

    if let Some((t, _, c)) = current.take() {
        out.push((t, c));
    }
    Ok(out)
}

/// Collapse per-column index rows into one index per name.
fn group_indexes(rows: Vec<Row>) -> Result<Vec<(String, Index)>> {
    let mut out: Vec<(String, Index)> = Vec::new();
    let mut current: Option<(String, Index)> = None;

    for row in rows {
        let table = text_at(&row, 0, "indexes.table_name")?;
        let name = text_at(&row, 1, "indexes.index_name")?;
        let column = text_at(&row, 2, "indexes.column_name")?;
        let unique = row.get(3).and_then(Value::as_bool).unwrap_or(false);

        let same_group = matches!(&current, Some((t, i)) if *t == table && i.name == name);
        if !same_group {
            if let Some(done) = current.take() {
                out.push(done);
            }
            current = Some((
                table,
                Index {
                    name,
                    columns: Vec::new(),
                    unique,
                },
            ));
        }

        if let Some((_, index)) = &mut current {
            index.columns.push(column);
        }
    }

    if let Some(done) = current.take() {
        out.push(done);
    }
    Ok(out)
}

fn text_at(row: &Row, idx: usize, what: &str) -> Result<String> {
    row.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            MigrateError::Database(format!("unexpected catalog row shape at {}", what).into())
        })
}
