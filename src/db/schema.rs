//! Schema introspection.
//!
//! Metadata queries come from the connection's dialect; their rows are folded
//! back into a [`TableDefinition`] by the same dialect, so the resulting model
//! can be rendered through any other dialect.

use tracing::debug;

use crate::db::connection::Connection;
use crate::dialect::MetadataQuery;
use crate::error::{DbError, DbResult};
use crate::models::{Row, TableDefinition};

/// Reads live metadata through a borrowed connection.
pub struct SchemaInspector<'a> {
    conn: &'a mut Connection,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Names of the tables in the connection's schema, in result order.
    pub fn list_tables(&mut self) -> DbResult<Vec<String>> {
        let schema = self.conn.config().schema.clone();
        let query = self.conn.dialect().list_tables_sql(schema.as_deref());
        let rows = self.conn.query(&query.sql, &query.params)?;

        Ok(rows
            .iter()
            .filter_map(|row| match row.get_index(0)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect())
    }

    /// Describe a table. `name` may be qualified as `schema.table`.
    pub fn describe(&mut self, name: &str) -> DbResult<TableDefinition> {
        let (schema, table_name) = match name.split_once('.') {
            Some((schema, table)) => (Some(schema.to_string()), table),
            None => (self.conn.config().schema.clone(), name),
        };
        let schema = schema.as_deref();
        let dialect = self.conn.dialect();

        let columns = self.fetch(table_name, dialect.describe_columns_sql(table_name, schema))?;
        if columns.is_empty() {
            return Err(DbError::introspection(
                format!("cannot describe {}. It has 0 columns.", table_name),
                table_name,
            ));
        }

        let mut table = TableDefinition::new(table_name);
        dialect.convert_column_descriptions(&mut table, &columns)?;

        let indexes = self.fetch(table_name, dialect.describe_indexes_sql(table_name, schema))?;
        for row in &indexes {
            dialect.convert_index_description(&mut table, row)?;
        }

        let foreign_keys =
            self.fetch(table_name, dialect.describe_foreign_keys_sql(table_name, schema))?;
        for row in &foreign_keys {
            dialect.convert_foreign_key_description(&mut table, row)?;
        }

        debug!(
            table = table_name,
            columns = table.columns().len(),
            indexes = table.indexes().len(),
            constraints = table.constraints().len(),
            "Described table"
        );
        Ok(table)
    }

    fn fetch(&mut self, table: &str, query: MetadataQuery) -> DbResult<Vec<Row>> {
        self.conn.query(&query.sql, &query.params).map_err(|e| {
            DbError::introspection_caused_by(
                format!("cannot describe {}: {}", table, e),
                table,
                e,
            )
        })
    }
}
