//! SQLite.
//!
//! Catalog access goes through the `pragma_*` table-valued functions, so the
//! metadata queries are plain selects that bind the table name.

use crate::dialect::expression::{FunctionRule, arg, call, infix, interval, singular_unit};
use crate::dialect::typemap::{TypeRule, apply_default, map_native_type, normalize_default};
use crate::dialect::{
    Dialect, ForeignKeyRow, MetadataQuery, PRIMARY_CONSTRAINT_NAME, fold_constraint,
    fold_foreign_key, fold_index, required_str,
};
use crate::error::DbResult;
use crate::models::{
    ColumnDefinition, ColumnType, ConstraintDefinition, ConstraintKind, DatabaseType,
    ForeignKeyAction, IndexKind, QueryParam, Row, TableDefinition,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

const DEFAULT_SCHEMA: &str = "main";

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT name
        FROM {schema}.sqlite_master
        WHERE type IN ('table', 'view')
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT name, type, "notnull", dflt_value, pk
        FROM pragma_table_info(?, ?)
        ORDER BY cid
        "#;

    pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            il.name AS name,
            il."unique" AS is_unique,
            il.origin AS origin,
            ii.name AS column_name
        FROM pragma_index_list(?, ?) AS il
        JOIN pragma_index_info(il.name, ?) AS ii
        ORDER BY il.seq, ii.seqno
        "#;

    pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT id, seq, "table", "from", "to", on_update, on_delete
        FROM pragma_foreign_key_list(?, ?)
        ORDER BY id, seq
        "#;
}

const TYPES: &[TypeRule] = &[
    TypeRule::new("varchar", ColumnType::String),
    TypeRule::new("character varying", ColumnType::String),
    TypeRule::new("nvarchar", ColumnType::String),
    TypeRule::new("varying character", ColumnType::String),
    TypeRule::fixed("char", ColumnType::String),
    TypeRule::fixed("character", ColumnType::String),
    TypeRule::fixed("nchar", ColumnType::String),
    TypeRule::new("text", ColumnType::Text),
    TypeRule::new("clob", ColumnType::Text),
    TypeRule::new("uuid", ColumnType::Uuid),
    TypeRule::new("integer", ColumnType::Integer),
    TypeRule::new("int", ColumnType::Integer),
    TypeRule::new("tinyint", ColumnType::Integer),
    TypeRule::new("smallint", ColumnType::Integer),
    TypeRule::new("mediumint", ColumnType::Integer),
    TypeRule::new("bigint", ColumnType::BigInteger),
    TypeRule::new("big int", ColumnType::BigInteger),
    TypeRule::new("int8", ColumnType::BigInteger),
    TypeRule::new("real", ColumnType::Float),
    TypeRule::new("double", ColumnType::Float),
    TypeRule::new("double precision", ColumnType::Float),
    TypeRule::new("float", ColumnType::Float),
    TypeRule::new("numeric", ColumnType::Decimal),
    TypeRule::new("decimal", ColumnType::Decimal),
    TypeRule::new("boolean", ColumnType::Boolean),
    TypeRule::new("bool", ColumnType::Boolean),
    TypeRule::new("date", ColumnType::Date),
    TypeRule::new("time", ColumnType::Time),
    TypeRule::new("datetime", ColumnType::DateTime),
    TypeRule::new("timestamp", ColumnType::Timestamp),
    TypeRule::new("blob", ColumnType::Binary),
    TypeRule::new("json", ColumnType::Json),
];

const FUNCTIONS: &[(&str, FunctionRule)] = &[
    ("CONCAT", concat),
    ("DATEDIFF", datediff),
    ("NOW", now),
    ("CURRENT_DATE", current_date),
    ("CURRENT_TIME", current_time),
    ("DAYOFWEEK", day_of_week),
    ("DATE_ADD", date_add),
    ("RAND", random),
    ("EXTRACT", extract),
];

fn concat(args: &[String]) -> String {
    infix(args, "||")
}

fn datediff(args: &[String]) -> String {
    format!("(julianday({}) - julianday({}))", arg(args, 0), arg(args, 1))
}

fn now(_: &[String]) -> String {
    "DATETIME('now')".to_string()
}

fn current_date(_: &[String]) -> String {
    "DATE('now')".to_string()
}

fn current_time(_: &[String]) -> String {
    "TIME('now')".to_string()
}

fn day_of_week(args: &[String]) -> String {
    format!("(CAST(STRFTIME('%w', {}) AS INTEGER) + 1)", arg(args, 0))
}

fn date_add(args: &[String]) -> String {
    let (amount, unit) = interval(args);
    let (amount, unit) = match singular_unit(&unit).as_str() {
        // weeks are not a date modifier
        "WEEK" => match amount.parse::<i64>() {
            Ok(weeks) => ((weeks * 7).to_string(), "DAY".to_string()),
            Err(_) => (amount, "DAY".to_string()),
        },
        other => (amount, other.to_string()),
    };
    let sign = if amount.starts_with('-') || amount.starts_with('+') {
        ""
    } else {
        "+"
    };
    format!(
        "DATETIME({}, '{sign}{amount} {}')",
        arg(args, 0),
        unit.to_lowercase()
    )
}

fn random(_: &[String]) -> String {
    "ABS(RANDOM() / 9223372036854775808.0)".to_string()
}

fn extract(args: &[String]) -> String {
    let format = match singular_unit(arg(args, 0)).as_str() {
        "YEAR" => "%Y",
        "MONTH" => "%m",
        "DAY" => "%d",
        "HOUR" => "%H",
        "MINUTE" => "%M",
        "SECOND" => "%S",
        "WEEK" => "%W",
        "DOW" => "%w",
        "DOY" => "%j",
        _ => return call("EXTRACT", args),
    };
    format!("CAST(STRFTIME('{format}', {}) AS INTEGER)", arg(args, 1))
}

fn schema_param(schema: Option<&str>) -> QueryParam {
    schema.unwrap_or(DEFAULT_SCHEMA).into()
}

impl Dialect for SqliteDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn start_quote(&self) -> char {
        '"'
    }

    fn end_quote(&self) -> char {
        '"'
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::String if column.fixed => match column.length {
                Some(length) => format!("CHAR({length})"),
                None => "CHAR".to_string(),
            },
            ColumnType::String => match column.length {
                Some(length) => format!("VARCHAR({length})"),
                None => "VARCHAR".to_string(),
            },
            ColumnType::Text | ColumnType::Json => "TEXT".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
            ColumnType::Integer if column.unsigned => "UNSIGNED INTEGER".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => super::float_type_sql(column),
            ColumnType::Decimal => super::decimal_type_sql(column),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
        }
    }

    fn truncate_table_sql(&self, table: &TableDefinition) -> String {
        format!("DELETE FROM {}", self.table_name_sql(table))
    }

    fn disable_foreign_key_sql(&self) -> String {
        "PRAGMA foreign_keys = OFF".to_string()
    }

    fn enable_foreign_key_sql(&self) -> String {
        "PRAGMA foreign_keys = ON".to_string()
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> MetadataQuery {
        let schema = self.quote_identifier(schema.unwrap_or(DEFAULT_SCHEMA));
        MetadataQuery::new(queries::LIST_TABLES.replace("{schema}", &schema), vec![])
    }

    fn describe_columns_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_COLUMNS,
            vec![table.into(), schema_param(schema)],
        )
    }

    fn describe_indexes_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_INDEXES,
            vec![table.into(), schema_param(schema), schema_param(schema)],
        )
    }

    fn describe_foreign_keys_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_FOREIGN_KEYS,
            vec![table.into(), schema_param(schema)],
        )
    }

    fn convert_column_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "name", table)?;
        let native = row.get_str("type").unwrap_or_default();

        let mut column = map_native_type(&native, TYPES, true);
        column.nullable = Some(!row.get_bool("notnull"));
        apply_default(
            &mut column,
            normalize_default(row.get_str("dflt_value").as_deref()),
        );
        table.add_column(name.as_str(), column);

        // pk is the 1-based position within the primary key, 0 when not part of it
        let position = row.get_i64("pk").unwrap_or(0);
        if position > 0 {
            fold_constraint(
                table,
                PRIMARY_CONSTRAINT_NAME,
                ConstraintKind::Primary,
                &name,
                Some(position as usize - 1),
            )?;
        }
        Ok(())
    }

    fn convert_column_descriptions(&self, table: &mut TableDefinition, rows: &[Row]) -> DbResult<()> {
        for row in rows {
            self.convert_column_description(table, row)?;
        }

        // rows arrive in cid order, not key order
        let mut keyed: Vec<(i64, String)> = rows
            .iter()
            .filter_map(|row| {
                let position = row.get_i64("pk").filter(|p| *p > 0)?;
                Some((position, row.get_str("name")?))
            })
            .filter(|(_, name)| table.column(name).is_some())
            .collect();
        if keyed.len() < 2 {
            return Ok(());
        }
        keyed.sort_by_key(|(position, _)| *position);
        let columns: Vec<&str> = keyed.iter().map(|(_, name)| name.as_str()).collect();
        table.add_constraint(
            PRIMARY_CONSTRAINT_NAME,
            ConstraintDefinition::primary(&columns),
        )?;
        Ok(())
    }

    fn convert_index_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        // the primary key is already known from the column listing
        if row.get_str("origin").as_deref() == Some("pk") {
            return Ok(());
        }
        let name = required_str(row, "name", table)?;
        let Some(column) = row.get_str("column_name") else {
            return Ok(());
        };
        if row.get_bool("is_unique") {
            fold_constraint(table, &name, ConstraintKind::Unique, &column, None)
        } else {
            fold_index(table, &name, IndexKind::Index, &column, None)
        }
    }

    fn convert_foreign_key_description(
        &self,
        table: &mut TableDefinition,
        row: &Row,
    ) -> DbResult<()> {
        let id = row.get_i64("id").unwrap_or(0);
        let column = required_str(row, "from", table)?;
        let referenced_table = required_str(row, "table", table)?;
        let referenced_column = required_str(row, "to", table)?;

        // SQLite does not name foreign keys; later columns of a composite key
        // join the constraint created for the first one
        let suffix = format!("_{id}_fk");
        let name = table
            .constraints()
            .iter()
            .find(|c| c.kind == ConstraintKind::Foreign && c.name.ends_with(&suffix))
            .filter(|_| row.get_i64("seq").unwrap_or(0) > 0)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("{column}{suffix}"));

        let action = |key: &str| {
            row.get_str(key)
                .map(|a| ForeignKeyAction::parse(&a))
                .unwrap_or_default()
        };
        fold_foreign_key(
            table,
            ForeignKeyRow {
                name: &name,
                column: &column,
                referenced_table: &referenced_table,
                referenced_column: &referenced_column,
                on_update: action("on_update"),
                on_delete: action("on_delete"),
            },
        )
    }

    fn function_rules(&self) -> &'static [(&'static str, FunctionRule)] {
        FUNCTIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::TupleValues;
    use crate::models::{ConstraintDefinition, IndexDefinition};
    use serde_json::{Value as JsonValue, json};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn column_row(name: &str, native: &str, notnull: i64, default: JsonValue, pk: i64) -> Row {
        Row::new()
            .with("name", name)
            .with("type", native)
            .with("notnull", notnull)
            .with("dflt_value", default)
            .with("pk", pk)
    }

    #[test]
    fn test_create_table_keeps_primary_key_constraint() {
        let mut table = TableDefinition::new("articles");
        table
            .add_column("id", ColumnDefinition::new(ColumnType::Integer).not_null())
            .add_column(
                "title",
                ColumnDefinition::new(ColumnType::String)
                    .with_length(25)
                    .not_null(),
            )
            .add_column("guid", ColumnType::Uuid);
        table
            .add_constraint("primary", ConstraintDefinition::primary(&["id"]))
            .unwrap()
            .add_index("title_idx", IndexDefinition::fulltext(&["title"]))
            .unwrap();

        let sql = table.create_sql(&SqliteDialect);
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"articles\" (\n    \
                 \"id\" INTEGER NOT NULL,\n    \
                 \"title\" VARCHAR(25) NOT NULL,\n    \
                 \"guid\" CHAR(36),\n    \
                 PRIMARY KEY (\"id\")\n\
                 )"
                .to_string(),
                "CREATE INDEX \"title_idx\" ON \"articles\" (\"title\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_temporary_table_and_truncate() {
        let mut table = TableDefinition::new("scratch");
        table.add_column("n", ColumnType::Integer).set_temporary(true);
        assert!(table.create_sql(&SqliteDialect)[0].starts_with("CREATE TEMPORARY TABLE \"scratch\""));
        assert_eq!(table.truncate_sql(&SqliteDialect), "DELETE FROM \"scratch\"");
        assert_eq!(table.drop_sql(&SqliteDialect), "DROP TABLE \"scratch\"");
    }

    #[test]
    fn test_function_rewrites() {
        let d = SqliteDialect;
        assert_eq!(d.function_sql("CONCAT", &strings(&["a", "b"])), "(a || b)");
        assert_eq!(d.function_sql("NOW", &[]), "DATETIME('now')");
        assert_eq!(
            d.function_sql("DATEDIFF", &strings(&["a", "b"])),
            "(julianday(a) - julianday(b))"
        );
        assert_eq!(
            d.function_sql("DATE_ADD", &strings(&["created", "3", "DAY"])),
            "DATETIME(created, '+3 day')"
        );
        assert_eq!(
            d.function_sql("DATE_ADD", &strings(&["created", "2", "weeks"])),
            "DATETIME(created, '+14 day')"
        );
        assert_eq!(
            d.function_sql("EXTRACT", &strings(&["year", "created"])),
            "CAST(STRFTIME('%Y', created) AS INTEGER)"
        );
        assert_eq!(
            d.function_sql("DAYOFWEEK", &strings(&["created"])),
            "(CAST(STRFTIME('%w', created) AS INTEGER) + 1)"
        );
    }

    #[test]
    fn test_tuple_comparison_is_expanded() {
        let sql = SqliteDialect.tuple_comparison_sql(
            &strings(&["a", "b"]),
            &TupleValues::Literals(vec![strings(&["1", "2"])]),
        )
        .unwrap();
        assert_eq!(sql, "((a = 1 AND b = 2))");
    }

    #[test]
    fn test_metadata_queries_bind_table_and_schema() {
        let query = SqliteDialect.describe_columns_sql("articles", None);
        assert!(query.sql.contains("pragma_table_info"));
        assert_eq!(
            query.params,
            vec![QueryParam::from("articles"), QueryParam::from("main")]
        );
        let list = SqliteDialect.list_tables_sql(Some("aux"));
        assert!(list.sql.contains("\"aux\".sqlite_master"));
        assert!(list.params.is_empty());
    }

    #[test]
    fn test_convert_columns_with_composite_primary_key() {
        let mut table = TableDefinition::new("memberships");
        for row in [
            column_row("group_id", "INTEGER", 1, JsonValue::Null, 2),
            column_row("user_id", "INTEGER", 1, JsonValue::Null, 1),
            column_row("role", "VARCHAR(20)", 0, json!("'member'"), 0),
            column_row("token", "CHAR(36)", 0, JsonValue::Null, 0),
            column_row("notes", "", 0, JsonValue::Null, 0),
        ] {
            SqliteDialect
                .convert_column_description(&mut table, &row)
                .unwrap();
        }

        assert_eq!(
            table.primary_key(),
            Some(&["user_id".to_string(), "group_id".to_string()][..])
        );
        let role = table.column("role").unwrap();
        assert_eq!(role.length, Some(20));
        assert_eq!(role.nullable, Some(true));
        assert_eq!(role.default, Some(json!("member")));
        assert_eq!(table.column_type("token"), Some(ColumnType::Uuid));
        assert_eq!(table.column_type("notes"), Some(ColumnType::Text));
    }

    #[test]
    fn test_column_listing_orders_primary_key_by_position() {
        let rows = [
            column_row("c", "INTEGER", 1, JsonValue::Null, 3),
            column_row("b", "INTEGER", 1, JsonValue::Null, 2),
            column_row("a", "INTEGER", 1, JsonValue::Null, 1),
            column_row("note", "TEXT", 0, JsonValue::Null, 0),
        ];
        let mut table = TableDefinition::new("triples");
        SqliteDialect
            .convert_column_descriptions(&mut table, &rows)
            .unwrap();

        assert_eq!(table.column_names(), vec!["c", "b", "a", "note"]);
        assert_eq!(
            table.primary_key(),
            Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
        );
        assert_eq!(table.constraints().len(), 1);
    }

    #[test]
    fn test_convert_indexes_skip_primary_key() {
        let mut table = TableDefinition::new("users");
        table
            .add_column("id", ColumnType::Integer)
            .add_column("email", ColumnType::String)
            .add_column("name", ColumnType::String);
        let rows = [
            ("sqlite_autoindex_users_1", 1, "pk", "id"),
            ("sqlite_autoindex_users_2", 1, "u", "email"),
            ("name_idx", 0, "c", "name"),
        ];
        for (name, unique, origin, column) in rows {
            let row = Row::new()
                .with("name", name)
                .with("is_unique", unique)
                .with("origin", origin)
                .with("column_name", column);
            SqliteDialect
                .convert_index_description(&mut table, &row)
                .unwrap();
        }
        assert!(table.primary_key().is_none());
        assert_eq!(
            table.constraint("sqlite_autoindex_users_2").unwrap().kind,
            ConstraintKind::Unique
        );
        assert_eq!(table.index("name_idx").unwrap().columns, vec!["name"]);
    }

    #[test]
    fn test_convert_composite_foreign_key() {
        let mut table = TableDefinition::new("lines");
        table
            .add_column("order_id", ColumnType::Integer)
            .add_column("order_rev", ColumnType::Integer);
        for (seq, from, to) in [(0, "order_id", "id"), (1, "order_rev", "rev")] {
            let row = Row::new()
                .with("id", 0)
                .with("seq", seq)
                .with("table", "orders")
                .with("from", from)
                .with("to", to)
                .with("on_update", "NO ACTION")
                .with("on_delete", "CASCADE");
            SqliteDialect
                .convert_foreign_key_description(&mut table, &row)
                .unwrap();
        }
        let fk = table.constraint("order_id_0_fk").unwrap();
        assert_eq!(fk.columns, vec!["order_id", "order_rev"]);
        assert_eq!(fk.references, vec!["orders", "id", "rev"]);
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
    }
}
