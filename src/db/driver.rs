//! The capability a [`Connection`](crate::db::Connection) needs from a
//! database driver.

use serde_json::Value as JsonValue;

use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::models::{ColumnType, DatabaseType, QueryParam, Row};

/// A blocking database driver holding at most one physical connection.
///
/// Every statement-issuing method takes `&mut self`, so a driver runs one
/// statement at a time.
pub trait Driver: Send {
    fn database_type(&self) -> DatabaseType;

    fn connect(&mut self) -> DbResult<()>;

    /// Close the physical connection. Does nothing when not connected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Run a command and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    /// Run a row-returning statement.
    fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>>;

    /// Id generated by the last insert on this connection, if any.
    fn last_insert_id(&mut self) -> DbResult<Option<i64>>;

    /// Dialect used to generate and introspect schema for this driver.
    fn schema_dialect(&self) -> &'static dyn Dialect {
        crate::dialect::for_database(self.database_type())
    }

    fn quote(&self, value: &JsonValue, column_type: Option<ColumnType>) -> String {
        self.schema_dialect().quote(value, column_type)
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        self.schema_dialect().quote_identifier(identifier)
    }

    fn supports_quoting(&self) -> bool {
        self.schema_dialect().supports_quoting()
    }

    fn supports_save_points(&self) -> bool {
        self.schema_dialect().supports_save_points()
    }
}
