//! SQL dialects.
//!
//! A [`Dialect`] renders a [`TableDefinition`] to DDL for one database
//! product, folds that product's catalog rows back into a definition, and
//! rewrites portable function calls and tuple comparisons into SQL the
//! product accepts. Dialects are stateless; [`for_database`] hands out shared
//! static instances.
//!
//! Most of the generation is shared through default methods on the trait.
//! Each backend only overrides its type names, quoting, metadata queries and
//! the handful of statements where the products disagree.

pub mod expression;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;
pub mod typemap;

use std::fmt;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDefinition, ColumnType, ConstraintDefinition, ConstraintKind, DatabaseType,
    ForeignKeyAction, IndexDefinition, IndexKind, QueryParam, Row, TableDefinition,
};

pub use expression::{FunctionRule, TupleValues};
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

/// Name given to introspected primary key constraints.
pub const PRIMARY_CONSTRAINT_NAME: &str = "primary";

/// A catalog query with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl MetadataQuery {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Get the shared dialect for a database product.
pub fn for_database(db_type: DatabaseType) -> &'static dyn Dialect {
    static MYSQL: MySqlDialect = MySqlDialect;
    static POSTGRES: PostgresDialect = PostgresDialect;
    static SQLITE: SqliteDialect = SqliteDialect;
    static SQLSERVER: SqlServerDialect = SqlServerDialect;

    match db_type {
        DatabaseType::MySQL => &MYSQL,
        DatabaseType::PostgreSQL => &POSTGRES,
        DatabaseType::SQLite => &SQLITE,
        DatabaseType::SqlServer => &SQLSERVER,
    }
}

pub trait Dialect: Send + Sync + fmt::Debug {
    fn database_type(&self) -> DatabaseType;

    fn name(&self) -> &'static str {
        self.database_type().display_name()
    }

    fn start_quote(&self) -> char;

    fn end_quote(&self) -> char;

    fn supports_quoting(&self) -> bool {
        true
    }

    fn supports_save_points(&self) -> bool {
        true
    }

    /// Whether `(a, b) IN (...)` is understood natively.
    fn supports_tuple_comparison(&self) -> bool {
        false
    }

    /// Placeholder for the 1-based parameter `index`.
    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    // ---------------------------------------------------------------------
    // Quoting and literals
    // ---------------------------------------------------------------------

    /// Quote an identifier; dotted names are quoted per segment and `*` is
    /// left alone.
    fn quote_identifier(&self, identifier: &str) -> String {
        if !self.supports_quoting() {
            return identifier.to_string();
        }
        let (start, end) = (self.start_quote(), self.end_quote());
        identifier
            .split('.')
            .map(|segment| {
                if segment == "*" {
                    segment.to_string()
                } else {
                    let escaped = segment.replace(end, &format!("{end}{end}"));
                    format!("{start}{escaped}{end}")
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_identifiers(&self, identifiers: &[String]) -> String {
        identifiers
            .iter()
            .map(|i| self.quote_identifier(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Render a value as a SQL literal for a column of `column_type`.
    ///
    /// Temporal columns keep the current-time keywords unquoted; arrays and
    /// objects are written as their JSON text.
    fn quote(&self, value: &JsonValue, column_type: Option<ColumnType>) -> String {
        match value {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::Bool(b) => self.bool_literal(*b).to_string(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::String(s) => {
                if column_type.is_some_and(|t| t.is_temporal()) && is_time_keyword(s) {
                    s.to_uppercase()
                } else if column_type == Some(ColumnType::Boolean) {
                    match s.to_lowercase().as_str() {
                        "true" | "1" => self.bool_literal(true).to_string(),
                        "false" | "0" => self.bool_literal(false).to_string(),
                        _ => self.quote_string(s),
                    }
                } else {
                    self.quote_string(s)
                }
            }
            other => self.quote_string(&other.to_string()),
        }
    }

    // ---------------------------------------------------------------------
    // Forward mapping
    // ---------------------------------------------------------------------

    /// Native type of a column, including length, precision and sign.
    fn column_type_sql(&self, column: &ColumnDefinition) -> String;

    /// Replacement type for a generated key column, when the product has one.
    fn serial_type_sql(&self, _column: &ColumnDefinition) -> Option<String> {
        None
    }

    /// Trailing column attributes (`AUTO_INCREMENT`, `COMMENT '...'`).
    fn column_modifiers(
        &self,
        _table: &TableDefinition,
        _column: &ColumnDefinition,
    ) -> Vec<String> {
        Vec::new()
    }

    fn column_sql(&self, table: &TableDefinition, column: &ColumnDefinition) -> String {
        let name = self.quote_identifier(&column.name);
        if table.is_serial_column(column) {
            if let Some(serial) = self.serial_type_sql(column) {
                return format!("{name} {serial}");
            }
        }

        let mut sql = format!("{name} {}", self.column_type_sql(column));
        if column.nullable == Some(false) {
            sql.push_str(" NOT NULL");
        }
        match column.default_value() {
            Some(value) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(&self.quote(value, Some(column.column_type)));
            }
            None if column.nullable == Some(true) => sql.push_str(" DEFAULT NULL"),
            None => {}
        }
        for modifier in self.column_modifiers(table, column) {
            sql.push(' ');
            sql.push_str(&modifier);
        }
        sql
    }

    fn foreign_key_action_sql(&self, action: ForeignKeyAction) -> &'static str {
        action.sql()
    }

    fn constraint_sql(
        &self,
        _table: &TableDefinition,
        constraint: &ConstraintDefinition,
    ) -> String {
        let columns = self.quote_identifiers(&constraint.columns);
        match constraint.kind {
            ConstraintKind::Primary => format!("PRIMARY KEY ({columns})"),
            ConstraintKind::Unique => self.unique_constraint_sql(constraint),
            ConstraintKind::Foreign => format!(
                "CONSTRAINT {} FOREIGN KEY ({columns}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
                self.quote_identifier(&constraint.name),
                self.quote_identifier(constraint.referenced_table().unwrap_or_default()),
                self.quote_identifiers(constraint.referenced_columns()),
                self.foreign_key_action_sql(constraint.on_update),
                self.foreign_key_action_sql(constraint.on_delete),
            ),
        }
    }

    fn unique_constraint_sql(&self, constraint: &ConstraintDefinition) -> String {
        format!(
            "CONSTRAINT {} UNIQUE ({})",
            self.quote_identifier(&constraint.name),
            self.quote_identifiers(&constraint.columns)
        )
    }

    /// Whether indexes are declared inside `CREATE TABLE`.
    fn inline_indexes(&self) -> bool {
        false
    }

    /// Index clause or statement. Products without full-text indexes get a
    /// plain index.
    fn index_sql(&self, table: &TableDefinition, index: &IndexDefinition) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(&index.name),
            self.quote_identifier(table.name()),
            self.quote_identifiers(&index.columns)
        )
    }

    /// Text appended after the closing parenthesis of `CREATE TABLE`.
    fn table_options_sql(&self, _table: &TableDefinition) -> String {
        String::new()
    }

    /// Out-of-line statement attaching a column comment.
    fn comment_sql(&self, _table: &TableDefinition, _column: &ColumnDefinition) -> Option<String> {
        None
    }

    fn create_table_keyword(&self, table: &TableDefinition) -> String {
        if table.is_temporary() {
            "CREATE TEMPORARY TABLE".to_string()
        } else {
            "CREATE TABLE".to_string()
        }
    }

    fn table_name_sql(&self, table: &TableDefinition) -> String {
        self.quote_identifier(table.name())
    }

    fn create_table_sql(&self, table: &TableDefinition) -> Vec<String> {
        let mut lines: Vec<String> = table
            .columns()
            .iter()
            .map(|c| self.column_sql(table, c))
            .collect();
        lines.extend(
            table
                .constraints()
                .iter()
                .map(|c| self.constraint_sql(table, c)),
        );
        if self.inline_indexes() {
            lines.extend(table.indexes().iter().map(|i| self.index_sql(table, i)));
        }

        let mut statements = vec![format!(
            "{} {} (\n    {}\n){}",
            self.create_table_keyword(table),
            self.table_name_sql(table),
            lines.join(",\n    "),
            self.table_options_sql(table)
        )];
        if !self.inline_indexes() {
            statements.extend(table.indexes().iter().map(|i| self.index_sql(table, i)));
        }
        statements.extend(
            table
                .columns()
                .iter()
                .filter(|c| c.comment.as_deref().is_some_and(|s| !s.is_empty()))
                .filter_map(|c| self.comment_sql(table, c)),
        );
        statements
    }

    fn drop_table_sql(&self, table: &TableDefinition) -> String {
        format!("DROP TABLE {}", self.table_name_sql(table))
    }

    fn truncate_table_sql(&self, table: &TableDefinition) -> String {
        format!("TRUNCATE TABLE {}", self.table_name_sql(table))
    }

    fn disable_foreign_key_sql(&self) -> String;

    fn enable_foreign_key_sql(&self) -> String;

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    fn begin_sql(&self) -> String {
        "BEGIN".to_string()
    }

    fn commit_sql(&self) -> String {
        "COMMIT".to_string()
    }

    fn rollback_sql(&self) -> String {
        "ROLLBACK".to_string()
    }

    fn savepoint_sql(&self, level: u32) -> String {
        format!("SAVEPOINT LEVEL{level}")
    }

    /// `None` when the product releases savepoints implicitly.
    fn release_savepoint_sql(&self, level: u32) -> Option<String> {
        Some(format!("RELEASE SAVEPOINT LEVEL{level}"))
    }

    fn rollback_savepoint_sql(&self, level: u32) -> String {
        format!("ROLLBACK TO SAVEPOINT LEVEL{level}")
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Tables and views of `schema` (or the connection's default), one name
    /// per row in the first column.
    fn list_tables_sql(&self, schema: Option<&str>) -> MetadataQuery;

    fn describe_columns_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery;

    fn describe_indexes_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery;

    fn describe_foreign_keys_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery;

    fn convert_column_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()>;

    /// Fold a whole column listing. Dialects whose key positions only make
    /// sense across rows override this.
    fn convert_column_descriptions(&self, table: &mut TableDefinition, rows: &[Row]) -> DbResult<()> {
        for row in rows {
            self.convert_column_description(table, row)?;
        }
        Ok(())
    }

    fn convert_index_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()>;

    fn convert_foreign_key_description(
        &self,
        table: &mut TableDefinition,
        row: &Row,
    ) -> DbResult<()>;

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// Rewrite rules keyed by upper-case function name.
    fn function_rules(&self) -> &'static [(&'static str, FunctionRule)] {
        &[]
    }

    /// Render a portable function call. Names without a rule pass through as
    /// `NAME(arg, ...)`.
    fn function_sql(&self, name: &str, args: &[String]) -> String {
        let upper = name.to_uppercase();
        match self.function_rules().iter().find(|(n, _)| *n == upper) {
            Some((_, rule)) => rule(args),
            None => expression::call(name, args),
        }
    }

    /// Render `(columns) IN values`. `columns` and `values` are SQL
    /// fragments, already quoted by the caller. An empty literal list renders
    /// as the always-false `1 = 0`; rows narrower or wider than `columns` fail.
    fn tuple_comparison_sql(&self, columns: &[String], values: &TupleValues) -> DbResult<String> {
        if self.supports_tuple_comparison() {
            expression::native_tuple_in(columns, values)
        } else {
            expression::expanded_tuple_in(columns, values, false)
        }
    }
}

fn is_time_keyword(value: &str) -> bool {
    matches!(
        value.to_uppercase().as_str(),
        "CURRENT_TIMESTAMP"
            | "CURRENT_DATE"
            | "CURRENT_TIME"
            | "NOW()"
            | "LOCALTIMESTAMP"
            | "GETDATE()"
    )
}

/// Non-null string value of a catalog row column the converter cannot do
/// without.
pub(crate) fn required_str(row: &Row, key: &str, table: &TableDefinition) -> DbResult<String> {
    row.get_str(key).ok_or_else(|| {
        DbError::introspection(
            format!("catalog row has no value for '{key}'"),
            table.name(),
        )
    })
}

/// Non-empty string value of a catalog row column.
pub(crate) fn optional_str(row: &Row, key: &str) -> Option<String> {
    row.get_str(key).filter(|s| !s.is_empty())
}

/// `DECIMAL`, `DECIMAL(l,0)` or `DECIMAL(l,p)`.
pub(crate) fn decimal_type_sql(column: &ColumnDefinition) -> String {
    match (column.length, column.precision) {
        (None, _) => "DECIMAL".to_string(),
        (Some(length), None) => format!("DECIMAL({length},0)"),
        (Some(length), Some(precision)) => format!("DECIMAL({length},{precision})"),
    }
}

/// `FLOAT` or `FLOAT(p)`.
pub(crate) fn float_type_sql(column: &ColumnDefinition) -> String {
    match column.precision {
        Some(precision) => format!("FLOAT({precision})"),
        None => "FLOAT".to_string(),
    }
}

// -------------------------------------------------------------------------
// Row folding shared by the converters
// -------------------------------------------------------------------------

/// Append `column` to the named index, creating it on first sight.
pub(crate) fn fold_index(
    table: &mut TableDefinition,
    name: &str,
    kind: IndexKind,
    column: &str,
    length: Option<u32>,
) -> DbResult<()> {
    if table.column(column).is_none() {
        debug!(index = name, column, "Skipping index column not on table");
        return Ok(());
    }
    let mut index = table
        .index(name)
        .cloned()
        .unwrap_or_else(|| IndexDefinition::new(kind, &[]));
    if !index.columns.iter().any(|c| c == column) {
        index.columns.push(column.to_string());
    }
    if let Some(length) = length {
        index.lengths.insert(column.to_string(), length);
    }
    table.add_index(name, index)?;
    Ok(())
}

/// Append `column` to the named primary or unique constraint.
pub(crate) fn fold_constraint(
    table: &mut TableDefinition,
    name: &str,
    kind: ConstraintKind,
    column: &str,
    position: Option<usize>,
) -> DbResult<()> {
    if table.column(column).is_none() {
        debug!(
            constraint = name,
            column,
            "Skipping constraint column not on table"
        );
        return Ok(());
    }
    let mut constraint = table
        .constraint(name)
        .cloned()
        .unwrap_or_else(|| ConstraintDefinition::new(kind, &[]));
    if !constraint.columns.iter().any(|c| c == column) {
        let at = position
            .unwrap_or(constraint.columns.len())
            .min(constraint.columns.len());
        constraint.columns.insert(at, column.to_string());
    }
    table.add_constraint(name, constraint)?;
    Ok(())
}

/// One row of a foreign key listing.
pub(crate) struct ForeignKeyRow<'a> {
    pub name: &'a str,
    pub column: &'a str,
    pub referenced_table: &'a str,
    pub referenced_column: &'a str,
    pub on_update: ForeignKeyAction,
    pub on_delete: ForeignKeyAction,
}

/// Append a local/referenced column pair to the named foreign constraint.
pub(crate) fn fold_foreign_key(table: &mut TableDefinition, fk: ForeignKeyRow<'_>) -> DbResult<()> {
    if table.column(fk.column).is_none() {
        debug!(
            constraint = fk.name,
            column = fk.column,
            "Skipping foreign key column not on table"
        );
        return Ok(());
    }
    let constraint = match table.constraint(fk.name) {
        Some(existing) if existing.kind == ConstraintKind::Foreign => {
            let mut existing = existing.clone();
            existing.columns.push(fk.column.to_string());
            existing.references.push(fk.referenced_column.to_string());
            existing
        }
        _ => ConstraintDefinition::foreign(
            &[fk.column],
            &[fk.referenced_table, fk.referenced_column],
        )
        .with_on_update(fk.on_update)
        .with_on_delete(fk.on_delete),
    };
    table.add_constraint(fk.name, constraint)?;
    Ok(())
}
