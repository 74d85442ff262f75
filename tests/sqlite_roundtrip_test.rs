//! Integration tests against a real SQLite file through the sqlx driver.
//!
//! Tests verify that:
//! - DDL generated by the SQLite dialect is accepted by SQLite
//! - Introspection reads the created schema back into the same model
//! - Savepoints work on a live connection
//! - The introspected model renders for another product

use dbal::config::DatabaseConfig;
use dbal::db::Connection;
use dbal::dialect::for_database;
use dbal::models::{
    ColumnDefinition, ColumnType, ConstraintDefinition, ConstraintKind,
    DatabaseType, ForeignKeyAction, IndexDefinition, IndexKind, QueryParam, TableDefinition,
};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

/// Route statement logs to the test output; filter with RUST_LOG.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Open a connection to a fresh SQLite database file.
fn setup_db() -> (Connection, tempfile::TempPath) {
    init_tracing();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.into_temp_path();
    let url = format!(
        "roundtrip=sqlite:{}?save_points=true&log_queries=true",
        path.to_str().unwrap()
    );
    let config = DatabaseConfig::parse(&url)
        .unwrap()
        .to_connection_config()
        .unwrap();
    assert!(config.save_points);
    assert!(!config.connection_string.contains("save_points"));
    let conn = Connection::open(config).unwrap();
    (conn, path)
}

fn authors() -> TableDefinition {
    let mut table = TableDefinition::new("authors");
    table
        .add_column("id", ColumnDefinition::new(ColumnType::Integer).not_null())
        .add_column("name", ColumnDefinition::new(ColumnType::String).with_length(100));
    table
        .add_constraint("primary", ConstraintDefinition::primary(&["id"]))
        .unwrap();
    table
}

fn articles() -> TableDefinition {
    let mut table = TableDefinition::new("articles");
    table
        .add_column("id", ColumnDefinition::new(ColumnType::Integer).not_null())
        .add_column(
            "title",
            ColumnDefinition::new(ColumnType::String)
                .with_length(25)
                .not_null(),
        )
        .add_column("author_id", ColumnType::Integer)
        .add_column(
            "published",
            ColumnDefinition::new(ColumnType::Boolean).with_default(false),
        );
    table
        .add_constraint("primary", ConstraintDefinition::primary(&["id"]))
        .unwrap()
        .add_constraint("title_uq", ConstraintDefinition::unique(&["title"]))
        .unwrap()
        .add_constraint(
            "author_fk",
            ConstraintDefinition::foreign(&["author_id"], &["authors", "id"])
                .with_on_update(ForeignKeyAction::SetNull),
        )
        .unwrap()
        .add_index("author_idx", IndexDefinition::index(&["author_id"]))
        .unwrap();
    table
}

#[test]
fn test_create_and_describe_round_trip() {
    let (mut conn, _path) = setup_db();
    conn.create_table(&authors()).unwrap();
    conn.create_table(&articles()).unwrap();

    let tables = conn.schema().list_tables().unwrap();
    assert_eq!(tables, vec!["articles", "authors"]);

    let table = conn.schema().describe("articles").unwrap();
    assert_eq!(
        table.column_names(),
        vec!["id", "title", "author_id", "published"]
    );
    let title = table.column("title").unwrap();
    assert_eq!(title.column_type, ColumnType::String);
    assert_eq!(title.length, Some(25));
    assert_eq!(title.nullable, Some(false));
    assert_eq!(table.column_type("published"), Some(ColumnType::Boolean));
    assert_eq!(
        table.column("published").unwrap().default,
        Some(serde_json::Value::Bool(false))
    );
    assert_eq!(table.primary_key(), Some(&["id".to_string()][..]));

    assert!(
        table
            .constraints()
            .iter()
            .any(|c| c.kind == ConstraintKind::Unique && c.columns == vec!["title".to_string()])
    );
    let index = table.index("author_idx").unwrap();
    assert_eq!(index.kind, IndexKind::Index);
    assert_eq!(index.columns, vec!["author_id".to_string()]);

    let fk = table
        .constraints()
        .iter()
        .find(|c| c.kind == ConstraintKind::Foreign)
        .unwrap();
    assert_eq!(fk.columns, vec!["author_id".to_string()]);
    assert_eq!(fk.referenced_table(), Some("authors"));
    assert_eq!(fk.on_update, ForeignKeyAction::SetNull);
    assert_eq!(fk.on_delete, ForeignKeyAction::Restrict);
}

#[test]
fn test_describe_missing_table_fails() {
    let (mut conn, _path) = setup_db();
    let err = conn.schema().describe("nothing_here").unwrap_err();
    assert!(err.to_string().contains("It has 0 columns."));
}

#[test]
fn test_introspected_schema_renders_for_postgres() {
    let (mut conn, _path) = setup_db();
    conn.create_table(&authors()).unwrap();
    conn.create_table(&articles()).unwrap();

    let table = conn.schema().describe("articles").unwrap();
    let sql = table.create_sql(for_database(DatabaseType::PostgreSQL));

    assert!(sql[0].contains("\"id\" SERIAL"));
    assert!(sql[0].contains("\"title\" VARCHAR(25) NOT NULL"));
    assert!(sql[0].contains("ON UPDATE SET NULL ON DELETE RESTRICT"));
    assert_eq!(
        table.truncate_sql(for_database(DatabaseType::PostgreSQL)),
        "TRUNCATE TABLE \"articles\" RESTART IDENTITY CASCADE"
    );
}

#[test]
fn test_savepoint_rollback_on_live_connection() {
    let (mut conn, _path) = setup_db();
    conn.create_table(&authors()).unwrap();

    conn.begin().unwrap();
    conn.execute(
        "INSERT INTO authors (name) VALUES (?)",
        &[QueryParam::from("kept")],
    )
    .unwrap();
    assert_eq!(conn.last_insert_id().unwrap(), Some(1));

    conn.begin().unwrap();
    conn.execute(
        "INSERT INTO authors (name) VALUES (?)",
        &[QueryParam::from("dropped")],
    )
    .unwrap();
    conn.rollback().unwrap();
    conn.commit().unwrap();

    let rows = conn
        .query("SELECT name FROM authors ORDER BY id", &[])
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name").as_deref(), Some("kept"));
}

#[test]
fn test_truncate_and_drop() {
    let (mut conn, _path) = setup_db();
    let authors = authors();
    conn.create_table(&authors).unwrap();
    conn.execute("INSERT INTO authors (name) VALUES ('a'), ('b')", &[])
        .unwrap();

    conn.truncate_table(&authors).unwrap();
    let rows = conn.query("SELECT COUNT(*) AS n FROM authors", &[]).unwrap();
    assert_eq!(rows[0].get_i64("n"), Some(0));

    conn.drop_table(&authors).unwrap();
    assert!(conn.schema().list_tables().unwrap().is_empty());
}
