//! MySQL and MariaDB.

use crate::dialect::expression::{FunctionRule, arg, extract_from, interval, singular_unit};
use crate::dialect::typemap::{TypeRule, apply_default, map_native_type, normalize_default};
use crate::dialect::{
    Dialect, ForeignKeyRow, MetadataQuery, PRIMARY_CONSTRAINT_NAME, fold_constraint,
    fold_foreign_key, fold_index, optional_str, required_str,
};
use crate::error::DbResult;
use crate::models::{
    ColumnDefinition, ColumnType, ConstraintDefinition, ConstraintKind, DatabaseType,
    ForeignKeyAction, IndexDefinition, IndexKind, QueryParam, Row, TableDefinition,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
        ORDER BY TABLE_NAME
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(EXTRA USING utf8) AS EXTRA,
            CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;

    pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            NON_UNIQUE,
            SUB_PART,
            CONVERT(INDEX_TYPE USING utf8) AS INDEX_TYPE
        FROM information_schema.STATISTICS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

    pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(k.CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
            CONVERT(k.COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(k.REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(k.REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME,
            CONVERT(r.UPDATE_RULE USING utf8) AS UPDATE_RULE,
            CONVERT(r.DELETE_RULE USING utf8) AS DELETE_RULE
        FROM information_schema.KEY_COLUMN_USAGE k
        JOIN information_schema.REFERENTIAL_CONSTRAINTS r
            ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
            AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
            AND r.TABLE_NAME = k.TABLE_NAME
        WHERE k.TABLE_NAME = ?
        AND k.TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND k.REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION
        "#;
}

const TYPES: &[TypeRule] = &[
    TypeRule::new("varchar", ColumnType::String),
    TypeRule::fixed("char", ColumnType::String),
    TypeRule::new("enum", ColumnType::String),
    TypeRule::new("set", ColumnType::String),
    TypeRule::sized("tinytext", ColumnType::Text, 255),
    TypeRule::new("text", ColumnType::Text),
    TypeRule::sized("mediumtext", ColumnType::Text, 16_777_215),
    TypeRule::sized("longtext", ColumnType::Text, 4_294_967_295),
    TypeRule::new("tinyint", ColumnType::Integer),
    TypeRule::new("smallint", ColumnType::Integer),
    TypeRule::new("mediumint", ColumnType::Integer),
    TypeRule::new("int", ColumnType::Integer),
    TypeRule::new("integer", ColumnType::Integer),
    TypeRule::new("year", ColumnType::Integer),
    TypeRule::new("bigint", ColumnType::BigInteger),
    TypeRule::new("float", ColumnType::Float),
    TypeRule::new("double", ColumnType::Float),
    TypeRule::new("double precision", ColumnType::Float),
    TypeRule::new("real", ColumnType::Float),
    TypeRule::new("decimal", ColumnType::Decimal),
    TypeRule::new("numeric", ColumnType::Decimal),
    TypeRule::new("bool", ColumnType::Boolean),
    TypeRule::new("boolean", ColumnType::Boolean),
    TypeRule::new("bit", ColumnType::Boolean),
    TypeRule::new("date", ColumnType::Date),
    TypeRule::new("time", ColumnType::Time),
    TypeRule::new("datetime", ColumnType::DateTime),
    TypeRule::new("timestamp", ColumnType::Timestamp),
    TypeRule::fixed("binary", ColumnType::Binary),
    TypeRule::new("varbinary", ColumnType::Binary),
    TypeRule::sized("tinyblob", ColumnType::Binary, 255),
    TypeRule::sized("blob", ColumnType::Binary, 65_535),
    TypeRule::sized("mediumblob", ColumnType::Binary, 16_777_215),
    TypeRule::new("longblob", ColumnType::Binary),
    TypeRule::new("json", ColumnType::Json),
];

const FUNCTIONS: &[(&str, FunctionRule)] = &[("DATE_ADD", date_add), ("EXTRACT", extract_from)];

fn date_add(args: &[String]) -> String {
    let (amount, unit) = interval(args);
    format!(
        "DATE_ADD({}, INTERVAL {} {})",
        arg(args, 0),
        amount,
        singular_unit(&unit)
    )
}

fn text_type(length: Option<u32>) -> &'static str {
    match length {
        None => "TEXT",
        Some(l) if l <= 255 => "TINYTEXT",
        Some(l) if l <= 65_535 => "TEXT",
        Some(l) if l <= 16_777_215 => "MEDIUMTEXT",
        Some(_) => "LONGTEXT",
    }
}

fn blob_type(length: Option<u32>) -> &'static str {
    match length {
        None => "LONGBLOB",
        Some(l) if l <= 255 => "TINYBLOB",
        Some(l) if l <= 65_535 => "BLOB",
        Some(l) if l <= 16_777_215 => "MEDIUMBLOB",
        Some(_) => "LONGBLOB",
    }
}

fn schema_param(schema: Option<&str>) -> QueryParam {
    schema.map_or(QueryParam::Null, QueryParam::from)
}

impl Dialect for MySqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn start_quote(&self) -> char {
        '`'
    }

    fn end_quote(&self) -> char {
        '`'
    }

    fn supports_tuple_comparison(&self) -> bool {
        true
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        let base = match column.column_type {
            ColumnType::String if column.fixed => {
                format!("CHAR({})", column.length.unwrap_or(255))
            }
            ColumnType::String => format!("VARCHAR({})", column.length.unwrap_or(255)),
            ColumnType::Text => text_type(column.length).to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => super::float_type_sql(column),
            ColumnType::Decimal => super::decimal_type_sql(column),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Binary => match column.length {
                Some(length) if column.fixed => format!("BINARY({length})"),
                length => blob_type(length).to_string(),
            },
            ColumnType::Json => "JSON".to_string(),
        };
        if column.unsigned && column.column_type.is_numeric() {
            format!("{base} UNSIGNED")
        } else {
            base
        }
    }

    fn column_modifiers(&self, table: &TableDefinition, column: &ColumnDefinition) -> Vec<String> {
        let mut modifiers = Vec::new();
        if table.is_serial_column(column) {
            modifiers.push("AUTO_INCREMENT".to_string());
        }
        if let Some(comment) = column.comment.as_deref().filter(|c| !c.is_empty()) {
            modifiers.push(format!("COMMENT {}", self.quote_string(comment)));
        }
        modifiers
    }

    fn unique_constraint_sql(&self, constraint: &ConstraintDefinition) -> String {
        format!(
            "UNIQUE KEY {} ({})",
            self.quote_identifier(&constraint.name),
            self.quote_identifiers(&constraint.columns)
        )
    }

    fn inline_indexes(&self) -> bool {
        true
    }

    fn index_sql(&self, _table: &TableDefinition, index: &IndexDefinition) -> String {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match index.lengths.get(c) {
                Some(length) => format!("{}({length})", self.quote_identifier(c)),
                None => self.quote_identifier(c),
            })
            .collect();
        let keyword = match index.kind {
            IndexKind::Index => "KEY",
            IndexKind::Fulltext => "FULLTEXT KEY",
        };
        format!(
            "{keyword} {} ({})",
            self.quote_identifier(&index.name),
            columns.join(", ")
        )
    }

    fn table_options_sql(&self, table: &TableDefinition) -> String {
        let options = table.options();
        let mut sql = String::new();
        if let Some(engine) = options.get("engine") {
            sql.push_str(&format!(" ENGINE={engine}"));
        }
        if let Some(charset) = options.get("charset") {
            sql.push_str(&format!(" DEFAULT CHARSET={charset}"));
        }
        if let Some(collation) = options.get("collation").or_else(|| options.get("collate")) {
            sql.push_str(&format!(" COLLATE={collation}"));
        }
        sql
    }

    fn disable_foreign_key_sql(&self) -> String {
        "SET foreign_key_checks = 0".to_string()
    }

    fn enable_foreign_key_sql(&self) -> String {
        "SET foreign_key_checks = 1".to_string()
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(queries::LIST_TABLES, vec![schema_param(schema)])
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
            vec![table.into(), schema_param(schema)],
        )
    }

    fn describe_foreign_keys_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_FOREIGN_KEYS,
            vec![table.into(), schema_param(schema)],
        )
    }

    fn convert_column_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "COLUMN_NAME", table)?;
        let native = required_str(row, "COLUMN_TYPE", table)?;

        let mut column = if native.trim().to_lowercase().starts_with("tinyint(1)") {
            ColumnDefinition::new(ColumnType::Boolean)
        } else {
            map_native_type(&native, TYPES, true)
        };
        column.nullable = Some(
            row.get_str("IS_NULLABLE")
                .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
        );
        if row
            .get_str("EXTRA")
            .is_some_and(|e| e.to_lowercase().contains("auto_increment"))
        {
            column.auto_increment = Some(true);
        }
        apply_default(
            &mut column,
            normalize_default(row.get_str("COLUMN_DEFAULT").as_deref()),
        );
        column.comment = optional_str(row, "COLUMN_COMMENT");

        table.add_column(name, column);
        Ok(())
    }

    fn convert_index_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "INDEX_NAME", table)?;
        let column = required_str(row, "COLUMN_NAME", table)?;

        if name == "PRIMARY" {
            return fold_constraint(
                table,
                PRIMARY_CONSTRAINT_NAME,
                ConstraintKind::Primary,
                &column,
                None,
            );
        }
        if row.get_i64("NON_UNIQUE") == Some(0) {
            return fold_constraint(table, &name, ConstraintKind::Unique, &column, None);
        }
        let kind = if row
            .get_str("INDEX_TYPE")
            .is_some_and(|t| t.eq_ignore_ascii_case("FULLTEXT"))
        {
            IndexKind::Fulltext
        } else {
            IndexKind::Index
        };
        let length = row.get_i64("SUB_PART").and_then(|l| u32::try_from(l).ok());
        fold_index(table, &name, kind, &column, length)
    }

    fn convert_foreign_key_description(
        &self,
        table: &mut TableDefinition,
        row: &Row,
    ) -> DbResult<()> {
        let name = required_str(row, "CONSTRAINT_NAME", table)?;
        let column = required_str(row, "COLUMN_NAME", table)?;
        let referenced_table = required_str(row, "REFERENCED_TABLE_NAME", table)?;
        let referenced_column = required_str(row, "REFERENCED_COLUMN_NAME", table)?;
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
                on_update: action("UPDATE_RULE"),
                on_delete: action("DELETE_RULE"),
            },
        )
    }

    fn function_rules(&self) -> &'static [(&'static str, FunctionRule)] {
        FUNCTIONS
    }
}
