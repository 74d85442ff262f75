//! dbal - database abstraction core.
//!
//! A backend-agnostic table model, dialects that render it to SQL for MySQL,
//! PostgreSQL, SQLite and SQL Server, introspection that reads live metadata
//! back into the model, and a connection with nested transactions.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;

pub use config::DatabaseConfig;
pub use db::{Connection, Driver, RecordingDriver, SqlxDriver};
pub use dialect::Dialect;
pub use error::{DbError, DbResult};
pub use models::{
    ColumnDefinition, ColumnType, ConnectionConfig, ConstraintDefinition, DatabaseType,
    IndexDefinition, TableDefinition,
};
