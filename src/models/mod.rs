//! Data models shared by the dialects, the drivers and the connection.

pub mod connection;
pub mod row;
pub mod schema;

pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use row::{QueryParam, Row};
pub use schema::{
    ColumnDefinition, ColumnType, ConstraintDefinition, ConstraintKind, ForeignKeyAction,
    IndexDefinition, IndexKind, TableDefinition, parse_default_value,
};
