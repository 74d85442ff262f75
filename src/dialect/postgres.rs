//! PostgreSQL.

use crate::dialect::expression::{FunctionRule, arg, extract_from, infix, interval, singular_unit};
use crate::dialect::typemap::{TypeRule, apply_default, map_native_type, normalize_default};
use crate::dialect::{
    Dialect, ForeignKeyRow, MetadataQuery, PRIMARY_CONSTRAINT_NAME, fold_constraint,
    fold_foreign_key, fold_index, optional_str, required_str,
};
use crate::error::DbResult;
use crate::models::{
    ColumnDefinition, ColumnType, ConstraintKind, DatabaseType, ForeignKeyAction,
    IndexDefinition, IndexKind, Row, TableDefinition,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

const DEFAULT_SCHEMA: &str = "public";

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = $1
        AND table_type IN ('BASE TABLE', 'VIEW')
        ORDER BY table_name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            a.attname AS name,
            format_type(a.atttypid, a.atttypmod) AS type,
            NOT a.attnotnull AS nullable,
            pg_get_expr(d.adbin, d.adrelid) AS column_default,
            a.attidentity <> '' AS is_identity,
            col_description(c.oid, a.attnum) AS comment
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE c.relname = $1 AND n.nspname = $2
        AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY a.attnum
        "#;

    pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            i.relname AS name,
            a.attname AS column_name,
            ix.indisprimary AS is_primary,
            ix.indisunique AS is_unique,
            am.amname AS method,
            pg_get_indexdef(ix.indexrelid, k.ord::int, true) AS expression
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_am am ON am.oid = i.relam
        CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE t.relname = $1 AND n.nspname = $2
        ORDER BY i.relname, k.ord
        "#;

    pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            con.conname AS name,
            la.attname AS column_name,
            rc.relname AS referenced_table,
            ra.attname AS referenced_column,
            con.confupdtype::text AS on_update,
            con.confdeltype::text AS on_delete
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_class rc ON rc.oid = con.confrelid
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(local_attnum, ref_attnum, ord)
        JOIN pg_attribute la ON la.attrelid = con.conrelid AND la.attnum = k.local_attnum
        JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
        WHERE con.contype = 'f' AND c.relname = $1 AND n.nspname = $2
        ORDER BY con.conname, k.ord
        "#;
}

const TYPES: &[TypeRule] = &[
    TypeRule::new("character varying", ColumnType::String),
    TypeRule::new("varchar", ColumnType::String),
    TypeRule::fixed("character", ColumnType::String),
    TypeRule::fixed("char", ColumnType::String),
    TypeRule::fixed("bpchar", ColumnType::String),
    TypeRule::new("text", ColumnType::Text),
    TypeRule::new("citext", ColumnType::Text),
    TypeRule::new("uuid", ColumnType::Uuid),
    TypeRule::new("smallint", ColumnType::Integer),
    TypeRule::new("integer", ColumnType::Integer),
    TypeRule::new("int", ColumnType::Integer),
    TypeRule::new("int2", ColumnType::Integer),
    TypeRule::new("int4", ColumnType::Integer),
    TypeRule::new("serial", ColumnType::Integer),
    TypeRule::new("bigint", ColumnType::BigInteger),
    TypeRule::new("int8", ColumnType::BigInteger),
    TypeRule::new("bigserial", ColumnType::BigInteger),
    TypeRule::new("real", ColumnType::Float),
    TypeRule::new("double precision", ColumnType::Float),
    TypeRule::new("float4", ColumnType::Float),
    TypeRule::new("float8", ColumnType::Float),
    TypeRule::new("numeric", ColumnType::Decimal),
    TypeRule::new("decimal", ColumnType::Decimal),
    TypeRule::new("money", ColumnType::Decimal),
    TypeRule::new("boolean", ColumnType::Boolean),
    TypeRule::new("bool", ColumnType::Boolean),
    TypeRule::new("date", ColumnType::Date),
    TypeRule::new("time", ColumnType::Time),
    TypeRule::new("time without time zone", ColumnType::Time),
    TypeRule::new("time with time zone", ColumnType::Time),
    TypeRule::new("timestamp", ColumnType::Timestamp),
    TypeRule::new("timestamp without time zone", ColumnType::Timestamp),
    TypeRule::new("timestamp with time zone", ColumnType::Timestamp),
    TypeRule::new("timestamptz", ColumnType::Timestamp),
    TypeRule::new("bytea", ColumnType::Binary),
    TypeRule::new("json", ColumnType::Json),
    TypeRule::new("jsonb", ColumnType::Json),
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
    ("EXTRACT", extract_from),
];

fn concat(args: &[String]) -> String {
    infix(args, "||")
}

fn datediff(args: &[String]) -> String {
    format!("({} - {})", arg(args, 0), arg(args, 1))
}

fn now(_: &[String]) -> String {
    "LOCALTIMESTAMP(0)".to_string()
}

fn current_date(_: &[String]) -> String {
    "CURRENT_DATE".to_string()
}

fn current_time(_: &[String]) -> String {
    "CURRENT_TIME".to_string()
}

fn day_of_week(args: &[String]) -> String {
    format!("(EXTRACT(DOW FROM {}) + 1)", arg(args, 0))
}

fn date_add(args: &[String]) -> String {
    let (amount, unit) = interval(args);
    format!(
        "({} + INTERVAL '{} {}')",
        arg(args, 0),
        amount,
        singular_unit(&unit)
    )
}

fn random(_: &[String]) -> String {
    "RANDOM()".to_string()
}

impl Dialect for PostgresDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn start_quote(&self) -> char {
        '"'
    }

    fn end_quote(&self) -> char {
        '"'
    }

    fn supports_tuple_comparison(&self) -> bool {
        true
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::String if column.fixed => match column.length {
                Some(36) => "UUID".to_string(),
                Some(length) => format!("CHAR({length})"),
                None => "CHAR".to_string(),
            },
            ColumnType::String => match column.length {
                Some(length) => format!("VARCHAR({length})"),
                None => "VARCHAR".to_string(),
            },
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => super::float_type_sql(column),
            ColumnType::Decimal => super::decimal_type_sql(column),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Json => "JSONB".to_string(),
        }
    }

    fn serial_type_sql(&self, column: &ColumnDefinition) -> Option<String> {
        match column.column_type {
            ColumnType::Integer => Some("SERIAL".to_string()),
            ColumnType::BigInteger => Some("BIGSERIAL".to_string()),
            _ => None,
        }
    }

    fn index_sql(&self, table: &TableDefinition, index: &IndexDefinition) -> String {
        let name = self.quote_identifier(&index.name);
        let table_name = self.quote_identifier(table.name());
        match index.kind {
            IndexKind::Index => format!(
                "CREATE INDEX {name} ON {table_name} ({})",
                self.quote_identifiers(&index.columns)
            ),
            IndexKind::Fulltext => {
                let document: Vec<String> = index
                    .columns
                    .iter()
                    .map(|c| format!("COALESCE({}, '')", self.quote_identifier(c)))
                    .collect();
                format!(
                    "CREATE INDEX {name} ON {table_name} USING gin(to_tsvector('english', {}))",
                    document.join(" || ' ' || ")
                )
            }
        }
    }

    fn comment_sql(&self, table: &TableDefinition, column: &ColumnDefinition) -> Option<String> {
        let comment = column.comment.as_deref()?;
        Some(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.quote_identifier(table.name()),
            self.quote_identifier(&column.name),
            self.quote_string(comment)
        ))
    }

    fn drop_table_sql(&self, table: &TableDefinition) -> String {
        format!("DROP TABLE {} CASCADE", self.table_name_sql(table))
    }

    fn truncate_table_sql(&self, table: &TableDefinition) -> String {
        let name = self.table_name_sql(table);
        if table.primary_key().is_some() {
            format!("TRUNCATE TABLE {name} RESTART IDENTITY CASCADE")
        } else {
            format!("TRUNCATE TABLE {name} CASCADE")
        }
    }

    fn disable_foreign_key_sql(&self) -> String {
        "SET CONSTRAINTS ALL DEFERRED".to_string()
    }

    fn enable_foreign_key_sql(&self) -> String {
        "SET CONSTRAINTS ALL IMMEDIATE".to_string()
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::LIST_TABLES,
            vec![schema.unwrap_or(DEFAULT_SCHEMA).into()],
        )
    }

    fn describe_columns_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_COLUMNS,
            vec![table.into(), schema.unwrap_or(DEFAULT_SCHEMA).into()],
        )
    }

    fn describe_indexes_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_INDEXES,
            vec![table.into(), schema.unwrap_or(DEFAULT_SCHEMA).into()],
        )
    }

    fn describe_foreign_keys_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_FOREIGN_KEYS,
            vec![table.into(), schema.unwrap_or(DEFAULT_SCHEMA).into()],
        )
    }

    fn convert_column_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "name", table)?;
        let native = required_str(row, "type", table)?;

        let mut column = map_native_type(&native, TYPES, false);
        column.nullable = Some(row.get_bool("nullable"));
        apply_default(
            &mut column,
            normalize_default(row.get_str("column_default").as_deref()),
        );
        if row.get_bool("is_identity") {
            column.auto_increment = Some(true);
        }
        column.comment = optional_str(row, "comment");

        table.add_column(name, column);
        Ok(())
    }

    fn convert_index_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "name", table)?;
        // expression indexes have no column name; only the tsvector form
        // written by index_sql maps back onto the model
        let Some(column) = row.get_str("column_name") else {
            if row.get_str("method").as_deref() != Some("gin") {
                return Ok(());
            }
            let expression = row.get_str("expression").unwrap_or_default();
            for column in tsvector_columns(&expression) {
                fold_index(table, &name, IndexKind::Fulltext, &column, None)?;
            }
            return Ok(());
        };

        if row.get_bool("is_primary") {
            return fold_constraint(
                table,
                PRIMARY_CONSTRAINT_NAME,
                ConstraintKind::Primary,
                &column,
                None,
            );
        }
        if row.get_bool("is_unique") {
            return fold_constraint(table, &name, ConstraintKind::Unique, &column, None);
        }
        let kind = if row.get_str("method").as_deref() == Some("gin") {
            IndexKind::Fulltext
        } else {
            IndexKind::Index
        };
        fold_index(table, &name, kind, &column, None)
    }

    fn convert_foreign_key_description(
        &self,
        table: &mut TableDefinition,
        row: &Row,
    ) -> DbResult<()> {
        let name = required_str(row, "name", table)?;
        let column = required_str(row, "column_name", table)?;
        let referenced_table = required_str(row, "referenced_table", table)?;
        let referenced_column = required_str(row, "referenced_column", table)?;
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

/// Columns fed to `to_tsvector(...)` as `COALESCE(column, '')` terms.
fn tsvector_columns(expression: &str) -> Vec<String> {
    if !expression.contains("to_tsvector") {
        return Vec::new();
    }
    expression
        .split("COALESCE(")
        .skip(1)
        .filter_map(|term| term.split(',').next())
        .map(|column| column.trim().trim_matches('"').replace("\"\"", "\""))
        .filter(|column| !column.is_empty())
        .collect()
}
