//! A database connection with nested transactions.
//!
//! The connection owns its [`Driver`] and tracks transaction nesting. The
//! outermost `begin()` issues `BEGIN`; nested levels become savepoints named
//! `LEVEL<n>` when savepoints are enabled, and are only counted otherwise.
//! Commit and rollback outside a transaction return `false` and send nothing.

use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use crate::db::driver::Driver;
use crate::db::schema::SchemaInspector;
use crate::db::sqlx_driver::SqlxDriver;
use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::models::{ColumnType, ConnectionConfig, QueryParam, Row, TableDefinition};

/// Transaction state of one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TransactionState {
    started: bool,
    level: u32,
}

pub struct Connection {
    config: ConnectionConfig,
    driver: Box<dyn Driver>,
    transaction: TransactionState,
    use_save_points: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.config.id)
            .field("db_type", &self.config.db_type)
            .field("transaction", &self.transaction)
            .field("use_save_points", &self.use_save_points)
            .finish()
    }
}

impl Connection {
    /// Open a connection through the bundled sqlx driver.
    pub fn open(config: ConnectionConfig) -> DbResult<Self> {
        let driver = SqlxDriver::new(&config)?;
        let mut conn = Self::with_driver(config, Box::new(driver));
        conn.connect()?;
        Ok(conn)
    }

    /// Wrap an existing driver. The driver is not connected here.
    pub fn with_driver(config: ConnectionConfig, driver: Box<dyn Driver>) -> Self {
        let save_points = config.save_points;
        let mut conn = Self {
            config,
            driver,
            transaction: TransactionState::default(),
            use_save_points: false,
        };
        conn.set_use_save_points(save_points);
        conn
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.driver.schema_dialect()
    }

    pub fn connect(&mut self) -> DbResult<()> {
        self.driver.connect()
    }

    /// Disconnect the driver, rolling back any open transaction first.
    pub fn disconnect(&mut self) {
        if self.transaction.started {
            self.abandon_transaction();
        }
        self.driver.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.log_statement(sql, params);
        self.driver.execute(sql, params)
    }

    pub fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        self.log_statement(sql, params);
        self.driver.query(sql, params)
    }

    fn log_statement(&self, sql: &str, params: &[QueryParam]) {
        if self.config.log_queries {
            debug!(connection_id = %self.config.id, sql, params = ?params, "Executing statement");
        } else {
            trace!(connection_id = %self.config.id, sql, params = params.len(), "Executing statement");
        }
    }

    pub fn last_insert_id(&mut self) -> DbResult<Option<i64>> {
        self.driver.last_insert_id()
    }

    pub fn quote(&self, value: &JsonValue, column_type: Option<ColumnType>) -> String {
        self.driver.quote(value, column_type)
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        self.driver.quote_identifier(identifier)
    }

    pub fn supports_quoting(&self) -> bool {
        self.driver.supports_quoting()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn in_transaction(&self) -> bool {
        self.transaction.started
    }

    /// Current nesting level, 0 for the outermost transaction.
    pub fn nesting_level(&self) -> Option<u32> {
        self.transaction.started.then_some(self.transaction.level)
    }

    pub fn use_save_points(&self) -> bool {
        self.use_save_points
    }

    /// Enable or disable savepoints for nested transactions. Enabling only
    /// takes effect when the driver supports savepoints; returns the
    /// resulting setting.
    pub fn set_use_save_points(&mut self, enabled: bool) -> bool {
        self.use_save_points = enabled && self.driver.supports_save_points();
        if enabled && !self.use_save_points {
            debug!(connection_id = %self.config.id, "Driver does not support savepoints");
        }
        self.use_save_points
    }

    pub fn begin(&mut self) -> DbResult<()> {
        let dialect = self.dialect();
        if !self.transaction.started {
            self.execute(&dialect.begin_sql(), &[])?;
            self.transaction = TransactionState {
                started: true,
                level: 0,
            };
            debug!(connection_id = %self.config.id, "Transaction started");
            return Ok(());
        }

        let level = self.transaction.level + 1;
        if self.use_save_points {
            self.execute(&dialect.savepoint_sql(level), &[])?;
        }
        self.transaction.level = level;
        debug!(connection_id = %self.config.id, level, "Nested transaction started");
        Ok(())
    }

    /// Commit the innermost transaction level. Returns `false` without
    /// sending anything when no transaction is open.
    pub fn commit(&mut self) -> DbResult<bool> {
        if !self.transaction.started {
            return Ok(false);
        }
        let dialect = self.dialect();
        let level = self.transaction.level;

        if level == 0 {
            self.execute(&dialect.commit_sql(), &[])?;
            self.transaction = TransactionState::default();
            debug!(connection_id = %self.config.id, "Transaction committed");
            return Ok(true);
        }

        if self.use_save_points {
            if let Some(sql) = dialect.release_savepoint_sql(level) {
                self.execute(&sql, &[])?;
            }
        }
        self.transaction.level = level - 1;
        debug!(connection_id = %self.config.id, level, "Nested transaction committed");
        Ok(true)
    }

    /// Roll back the innermost transaction level, or the whole transaction
    /// when at the outermost level or when savepoints are disabled.
    pub fn rollback(&mut self) -> DbResult<bool> {
        if !self.transaction.started {
            return Ok(false);
        }
        let level = self.transaction.level;
        if level == 0 || !self.use_save_points {
            return self.rollback_all();
        }

        let dialect = self.dialect();
        self.execute(&dialect.rollback_savepoint_sql(level), &[])?;
        self.transaction.level = level - 1;
        debug!(connection_id = %self.config.id, level, "Rolled back to savepoint");
        Ok(true)
    }

    /// Roll back to the beginning of the transaction regardless of nesting.
    pub fn rollback_all(&mut self) -> DbResult<bool> {
        if !self.transaction.started {
            return Ok(false);
        }
        let dialect = self.dialect();
        // the server has ended the transaction even if ROLLBACK errors
        self.transaction = TransactionState::default();
        self.execute(&dialect.rollback_sql(), &[])?;
        debug!(connection_id = %self.config.id, "Transaction rolled back");
        Ok(true)
    }

    /// Run `f` inside a transaction level: commit when it succeeds, roll
    /// back when it fails. The closure's error is returned.
    pub fn transactional<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Self) -> DbResult<T>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(
                        connection_id = %self.config.id,
                        error = %rollback_err,
                        "Rollback after failed transactional block failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Run `f` with foreign key checks disabled. Checks are re-enabled even
    /// when `f` fails.
    pub fn disable_constraints<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Self) -> DbResult<T>,
    {
        let dialect = self.dialect();
        self.execute(&dialect.disable_foreign_key_sql(), &[])?;
        let result = f(self);
        let enabled = self.execute(&dialect.enable_foreign_key_sql(), &[]);
        let value = result?;
        enabled?;
        Ok(value)
    }

    fn abandon_transaction(&mut self) {
        warn!(
            connection_id = %self.config.id,
            level = self.transaction.level,
            "Connection closed with an open transaction, rolling back"
        );
        if let Err(e) = self.rollback_all() {
            warn!(connection_id = %self.config.id, error = %e, "Rollback failed");
        }
    }

    // =========================================================================
    // Schema
    // =========================================================================

    pub fn schema(&mut self) -> SchemaInspector<'_> {
        SchemaInspector::new(self)
    }

    /// Create a table, running every statement of its DDL in order.
    pub fn create_table(&mut self, table: &TableDefinition) -> DbResult<()> {
        for sql in table.create_sql(self.dialect()) {
            self.execute(&sql, &[])?;
        }
        debug!(connection_id = %self.config.id, table = table.name(), "Created table");
        Ok(())
    }

    pub fn drop_table(&mut self, table: &TableDefinition) -> DbResult<()> {
        let sql = table.drop_sql(self.dialect());
        self.execute(&sql, &[])?;
        Ok(())
    }

    pub fn truncate_table(&mut self, table: &TableDefinition) -> DbResult<()> {
        let sql = table.truncate_sql(self.dialect());
        self.execute(&sql, &[])?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.transaction.started && self.driver.is_connected() {
            self.abandon_transaction();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::recording::RecordingDriver;
    use crate::error::DbError;
    use crate::models::DatabaseType;

    fn connection(db_type: DatabaseType, save_points: bool) -> (Connection, RecordingDriver) {
        let url = match db_type {
            DatabaseType::MySQL => "mysql://localhost/app",
            DatabaseType::PostgreSQL => "postgres://localhost/app",
            DatabaseType::SQLite => "sqlite::memory:",
            DatabaseType::SqlServer => "sqlserver://localhost/app",
        };
        let config = ConnectionConfig::new("test", url)
            .unwrap()
            .with_save_points(save_points);
        let driver = RecordingDriver::new(db_type);
        let conn = Connection::with_driver(config, Box::new(driver.clone()));
        (conn, driver)
    }

    #[test]
    fn test_nested_commit_without_save_points() {
        let (mut conn, driver) = connection(DatabaseType::PostgreSQL, false);
        conn.begin().unwrap();
        conn.begin().unwrap();
        assert_eq!(conn.nesting_level(), Some(1));
        assert!(conn.commit().unwrap());
        assert!(conn.commit().unwrap());
        assert!(!conn.in_transaction());
        assert_eq!(driver.sql(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn test_nested_commit_with_save_points() {
        let (mut conn, driver) = connection(DatabaseType::PostgreSQL, true);
        conn.begin().unwrap();
        conn.begin().unwrap();
        conn.commit().unwrap();
        conn.commit().unwrap();
        assert_eq!(
            driver.sql(),
            vec!["BEGIN", "SAVEPOINT LEVEL1", "RELEASE SAVEPOINT LEVEL1", "COMMIT"]
        );
    }

    #[test]
    fn test_commit_and_rollback_outside_transaction() {
        let (mut conn, driver) = connection(DatabaseType::MySQL, true);
        assert!(!conn.commit().unwrap());
        assert!(!conn.rollback().unwrap());
        assert!(!conn.rollback_all().unwrap());
        assert!(driver.sql().is_empty());
    }

    #[test]
    fn test_nested_rollback_to_save_point() {
        let (mut conn, driver) = connection(DatabaseType::MySQL, true);
        conn.begin().unwrap();
        conn.begin().unwrap();
        conn.begin().unwrap();
        conn.rollback().unwrap();
        assert_eq!(conn.nesting_level(), Some(1));
        conn.rollback().unwrap();
        conn.rollback().unwrap();
        assert_eq!(
            driver.sql(),
            vec![
                "BEGIN",
                "SAVEPOINT LEVEL1",
                "SAVEPOINT LEVEL2",
                "ROLLBACK TO SAVEPOINT LEVEL2",
                "ROLLBACK TO SAVEPOINT LEVEL1",
                "ROLLBACK",
            ]
        );
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_nested_rollback_without_save_points_ends_transaction() {
        let (mut conn, driver) = connection(DatabaseType::MySQL, false);
        conn.begin().unwrap();
        conn.begin().unwrap();
        assert!(conn.rollback().unwrap());
        assert!(!conn.in_transaction());
        assert!(!conn.commit().unwrap());
        assert_eq!(driver.sql(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_rollback_all_from_nested_level() {
        let (mut conn, driver) = connection(DatabaseType::SQLite, true);
        conn.begin().unwrap();
        conn.begin().unwrap();
        assert!(conn.rollback_all().unwrap());
        assert!(!conn.in_transaction());
        assert_eq!(driver.sql().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_save_points_follow_driver_support() {
        let config = ConnectionConfig::new("test", "postgres://localhost/app").unwrap();
        let driver = RecordingDriver::new(DatabaseType::PostgreSQL).with_save_points(false);
        let mut conn = Connection::with_driver(config, Box::new(driver));
        assert!(!conn.set_use_save_points(true));
        assert!(!conn.use_save_points());
        assert!(!conn.set_use_save_points(false));
    }

    #[test]
    fn test_save_point_setting_survives_transactions() {
        let (mut conn, _driver) = connection(DatabaseType::PostgreSQL, true);
        conn.begin().unwrap();
        conn.commit().unwrap();
        assert!(conn.use_save_points());
    }

    #[test]
    fn test_sqlserver_transaction_statements() {
        let (mut conn, driver) = connection(DatabaseType::SqlServer, true);
        conn.begin().unwrap();
        conn.begin().unwrap();
        conn.commit().unwrap();
        conn.begin().unwrap();
        conn.rollback().unwrap();
        conn.commit().unwrap();
        assert_eq!(
            driver.sql(),
            vec![
                "BEGIN TRANSACTION",
                "SAVE TRANSACTION LEVEL1",
                "SAVE TRANSACTION LEVEL1",
                "ROLLBACK TRANSACTION LEVEL1",
                "COMMIT TRANSACTION",
            ]
        );
    }

    #[test]
    fn test_transactional_commits_on_success() {
        let (mut conn, driver) = connection(DatabaseType::SQLite, false);
        let value = conn
            .transactional(|c| {
                c.execute("INSERT INTO t VALUES (1)", &[])?;
                Ok(42)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(driver.sql(), vec!["BEGIN", "INSERT INTO t VALUES (1)", "COMMIT"]);
    }

    #[test]
    fn test_transactional_rolls_back_on_error() {
        let (mut conn, driver) = connection(DatabaseType::SQLite, false);
        let result: DbResult<()> = conn.transactional(|_| Err(DbError::invalid_input("nope")));
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
        assert_eq!(driver.sql(), vec!["BEGIN", "ROLLBACK"]);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_failed_begin_leaves_state_untouched() {
        let (mut conn, driver) = connection(DatabaseType::PostgreSQL, true);
        driver.fail_execute("BEGIN");
        assert!(conn.begin().is_err());
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_disable_constraints_reenables_after_error() {
        let (mut conn, driver) = connection(DatabaseType::MySQL, false);
        let result: DbResult<()> =
            conn.disable_constraints(|_| Err(DbError::invalid_input("boom")));
        assert!(result.is_err());
        assert_eq!(
            driver.sql(),
            vec!["SET foreign_key_checks = 0", "SET foreign_key_checks = 1"]
        );
    }

    #[test]
    fn test_drop_rolls_back_open_transaction() {
        let (mut conn, driver) = connection(DatabaseType::PostgreSQL, true);
        conn.begin().unwrap();
        drop(conn);
        assert_eq!(driver.sql(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_create_table_runs_every_statement() {
        let (mut conn, driver) = connection(DatabaseType::PostgreSQL, false);
        let mut table = TableDefinition::new("tags");
        table.add_column("label", ColumnType::String);
        table
            .add_index("label_idx", crate::models::IndexDefinition::index(&["label"]))
            .unwrap();
        conn.create_table(&table).unwrap();
        conn.truncate_table(&table).unwrap();
        assert_eq!(
            driver.sql(),
            vec![
                "CREATE TABLE \"tags\" (\n    \"label\" VARCHAR\n)",
                "CREATE INDEX \"label_idx\" ON \"tags\" (\"label\")",
                "TRUNCATE TABLE \"tags\" CASCADE",
            ]
        );
    }
}
