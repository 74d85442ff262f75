//! An in-memory [`Driver`] that records statements instead of running them.
//!
//! Query results are scripted: each [`RecordingDriver::on_query`] entry is
//! consumed by the first later query whose SQL contains its pattern.
//! Unmatched queries return no rows. Clones share the same log and script,
//! so a test can keep a handle after moving the driver into a connection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::db::driver::Driver;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, Row};

/// One statement seen by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
    /// `true` for `query`, `false` for `execute`.
    pub is_query: bool,
}

enum Scripted {
    Rows(Vec<Row>),
    Fail(String),
}

#[derive(Default)]
struct State {
    connected: bool,
    statements: Vec<RecordedStatement>,
    script: VecDeque<(String, Scripted)>,
    failures: Vec<String>,
    save_points: Option<bool>,
    next_insert_id: i64,
}

#[derive(Clone)]
pub struct RecordingDriver {
    db_type: DatabaseType,
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for RecordingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingDriver")
            .field("db_type", &self.db_type)
            .field("statements", &self.statements().len())
            .finish()
    }
}

impl RecordingDriver {
    /// A connected recording driver for `db_type`.
    pub fn new(db_type: DatabaseType) -> Self {
        let state = State {
            connected: true,
            ..Default::default()
        };
        Self {
            db_type,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer the next query containing `pattern` with `rows`.
    pub fn on_query(&self, pattern: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.state()
            .script
            .push_back((pattern.into(), Scripted::Rows(rows)));
        self
    }

    /// Fail the next query containing `pattern`.
    pub fn fail_query(&self, pattern: impl Into<String>, message: impl Into<String>) -> &Self {
        self.state()
            .script
            .push_back((pattern.into(), Scripted::Fail(message.into())));
        self
    }

    /// Fail every command containing `pattern`.
    pub fn fail_execute(&self, pattern: impl Into<String>) -> &Self {
        self.state().failures.push(pattern.into());
        self
    }

    /// Override the dialect's savepoint capability.
    pub fn with_save_points(self, supported: bool) -> Self {
        self.state().save_points = Some(supported);
        self
    }

    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.state().statements.clone()
    }

    /// SQL of every statement, in order.
    pub fn sql(&self) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Number of recorded queries (not commands).
    pub fn query_count(&self) -> usize {
        self.state().statements.iter().filter(|s| s.is_query).count()
    }

    fn record(&self, sql: &str, params: &[QueryParam], is_query: bool) -> DbResult<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(DbError::connection(
                "Driver is not connected",
                "Call connect() before issuing statements",
            ));
        }
        state.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
            is_query,
        });
        Ok(())
    }
}

impl Driver for RecordingDriver {
    fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    fn connect(&mut self) -> DbResult<()> {
        self.state().connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.record(sql, params, false)?;
        let mut state = self.state();
        if state.failures.iter().any(|p| sql.contains(p.as_str())) {
            return Err(DbError::database(
                format!("scripted failure for: {}", sql),
                None,
                "Remove the scripted failure",
            ));
        }
        if sql.trim_start().to_uppercase().starts_with("INSERT") {
            state.next_insert_id += 1;
        }
        Ok(0)
    }

    fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        self.record(sql, params, true)?;
        let mut state = self.state();
        let Some(position) = state.script.iter().position(|(p, _)| sql.contains(p.as_str())) else {
            return Ok(Vec::new());
        };
        match state.script.remove(position) {
            Some((_, Scripted::Rows(rows))) => Ok(rows),
            Some((_, Scripted::Fail(message))) => {
                Err(DbError::database(message, None, "Check the scripted query"))
            }
            None => Ok(Vec::new()),
        }
    }

    fn last_insert_id(&mut self) -> DbResult<Option<i64>> {
        let id = self.state().next_insert_id;
        Ok((id > 0).then_some(id))
    }

    fn supports_save_points(&self) -> bool {
        self.state()
            .save_points
            .unwrap_or_else(|| self.schema_dialect().supports_save_points())
    }
}
