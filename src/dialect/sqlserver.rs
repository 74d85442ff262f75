//! Microsoft SQL Server.

use crate::dialect::expression::{self, FunctionRule, TupleValues, arg, infix, interval};
use crate::dialect::typemap::{TypeRule, apply_default, map_native_type, normalize_default};
use crate::dialect::{
    Dialect, ForeignKeyRow, MetadataQuery, PRIMARY_CONSTRAINT_NAME, fold_constraint,
    fold_foreign_key, fold_index, required_str,
};
use crate::error::DbResult;
use crate::models::{
    ColumnDefinition, ColumnType, ConstraintKind, DatabaseType, ForeignKeyAction, IndexKind, Row,
    TableDefinition,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

const DEFAULT_SCHEMA: &str = "dbo";

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = @p1
        ORDER BY TABLE_NAME
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.COLUMN_NAME AS name,
            c.DATA_TYPE AS type,
            c.CHARACTER_MAXIMUM_LENGTH AS char_length,
            c.NUMERIC_PRECISION AS numeric_precision,
            c.NUMERIC_SCALE AS numeric_scale,
            c.IS_NULLABLE AS is_nullable,
            c.COLUMN_DEFAULT AS column_default,
            COLUMNPROPERTY(
                OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)),
                c.COLUMN_NAME,
                'IsIdentity'
            ) AS is_identity
        FROM INFORMATION_SCHEMA.COLUMNS c
        WHERE c.TABLE_NAME = @p1 AND c.TABLE_SCHEMA = @p2
        ORDER BY c.ORDINAL_POSITION
        "#;

    pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            i.name AS name,
            c.name AS column_name,
            i.is_primary_key AS is_primary,
            i.is_unique AS is_unique
        FROM sys.indexes i
        JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE i.object_id = OBJECT_ID(@p1)
        AND i.name IS NOT NULL
        AND ic.is_included_column = 0
        ORDER BY i.name, ic.key_ordinal
        "#;

    pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            fk.name AS name,
            pc.name AS column_name,
            rt.name AS referenced_table,
            rc.name AS referenced_column,
            fk.update_referential_action_desc AS on_update,
            fk.delete_referential_action_desc AS on_delete
        FROM sys.foreign_keys fk
        JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
        JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
        JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
        JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
        WHERE fk.parent_object_id = OBJECT_ID(@p1)
        ORDER BY fk.name, fkc.constraint_column_id
        "#;
}

const TYPES: &[TypeRule] = &[
    TypeRule::new("nvarchar", ColumnType::String),
    TypeRule::new("varchar", ColumnType::String),
    TypeRule::fixed("nchar", ColumnType::String),
    TypeRule::fixed("char", ColumnType::String),
    TypeRule::new("ntext", ColumnType::Text),
    TypeRule::new("text", ColumnType::Text),
    TypeRule::new("xml", ColumnType::Text),
    TypeRule::new("uniqueidentifier", ColumnType::Uuid),
    TypeRule::new("tinyint", ColumnType::Integer),
    TypeRule::new("smallint", ColumnType::Integer),
    TypeRule::new("int", ColumnType::Integer),
    TypeRule::new("bigint", ColumnType::BigInteger),
    TypeRule::new("real", ColumnType::Float),
    TypeRule::new("float", ColumnType::Float),
    TypeRule::new("decimal", ColumnType::Decimal),
    TypeRule::new("numeric", ColumnType::Decimal),
    TypeRule::new("money", ColumnType::Decimal),
    TypeRule::new("smallmoney", ColumnType::Decimal),
    TypeRule::new("bit", ColumnType::Boolean),
    TypeRule::new("date", ColumnType::Date),
    TypeRule::new("time", ColumnType::Time),
    TypeRule::new("datetime", ColumnType::DateTime),
    TypeRule::new("datetime2", ColumnType::DateTime),
    TypeRule::new("smalldatetime", ColumnType::DateTime),
    TypeRule::new("datetimeoffset", ColumnType::Timestamp),
    TypeRule::new("binary", ColumnType::Binary),
    TypeRule::new("varbinary", ColumnType::Binary),
    TypeRule::new("image", ColumnType::Binary),
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
    infix(args, "+")
}

fn datediff(args: &[String]) -> String {
    format!("DATEDIFF(day, {}, {})", arg(args, 1), arg(args, 0))
}

fn now(_: &[String]) -> String {
    "GETDATE()".to_string()
}

fn current_date(_: &[String]) -> String {
    "CONVERT(date, GETDATE())".to_string()
}

fn current_time(_: &[String]) -> String {
    "CONVERT(time, GETDATE())".to_string()
}

fn day_of_week(args: &[String]) -> String {
    format!("DATEPART(weekday, {})", arg(args, 0))
}

/// DATEPART name for a portable unit.
fn date_part(unit: &str) -> String {
    match expression::singular_unit(unit).as_str() {
        "DOW" => "weekday".to_string(),
        "DOY" => "dayofyear".to_string(),
        other => other.to_lowercase(),
    }
}

fn date_add(args: &[String]) -> String {
    let (amount, unit) = interval(args);
    format!("DATEADD({}, {amount}, {})", date_part(&unit), arg(args, 0))
}

fn random(_: &[String]) -> String {
    "RAND()".to_string()
}

fn extract(args: &[String]) -> String {
    format!("DATEPART({}, {})", date_part(arg(args, 0)), arg(args, 1))
}

impl SqlServerDialect {
    /// `[schema].[table]` as accepted by `OBJECT_ID`.
    fn object_name(&self, table: &str, schema: Option<&str>) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(schema.unwrap_or(DEFAULT_SCHEMA)),
            self.quote_identifier(table)
        )
    }
}

impl Dialect for SqlServerDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn start_quote(&self) -> char {
        '['
    }

    fn end_quote(&self) -> char {
        ']'
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn column_type_sql(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::String if column.fixed && column.length == Some(36) => {
                "UNIQUEIDENTIFIER".to_string()
            }
            ColumnType::String if column.fixed => {
                format!("NCHAR({})", column.length.unwrap_or(255))
            }
            ColumnType::String => format!("NVARCHAR({})", column.length.unwrap_or(255)),
            ColumnType::Text | ColumnType::Json => "NVARCHAR(MAX)".to_string(),
            ColumnType::Uuid => "UNIQUEIDENTIFIER".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => super::float_type_sql(column),
            ColumnType::Decimal => super::decimal_type_sql(column),
            ColumnType::Boolean => "BIT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "DATETIME2".to_string(),
            ColumnType::Binary => match column.length {
                Some(length) => format!("VARBINARY({length})"),
                None => "VARBINARY(MAX)".to_string(),
            },
        }
    }

    fn serial_type_sql(&self, column: &ColumnDefinition) -> Option<String> {
        match column.column_type {
            ColumnType::Integer => Some("INTEGER IDENTITY(1, 1)".to_string()),
            ColumnType::BigInteger => Some("BIGINT IDENTITY(1, 1)".to_string()),
            _ => None,
        }
    }

    fn foreign_key_action_sql(&self, action: ForeignKeyAction) -> &'static str {
        match action {
            ForeignKeyAction::Restrict => ForeignKeyAction::NoAction.sql(),
            other => other.sql(),
        }
    }

    fn comment_sql(&self, table: &TableDefinition, column: &ColumnDefinition) -> Option<String> {
        let comment = column.comment.as_deref()?;
        Some(format!(
            "EXEC sp_addextendedproperty N'MS_Description', N{}, N'SCHEMA', N'{DEFAULT_SCHEMA}', \
             N'TABLE', N{}, N'COLUMN', N{}",
            self.quote_string(comment),
            self.quote_string(table.name()),
            self.quote_string(&column.name)
        ))
    }

    fn create_table_keyword(&self, _table: &TableDefinition) -> String {
        "CREATE TABLE".to_string()
    }

    /// Temporary tables live under a `#` prefix.
    fn table_name_sql(&self, table: &TableDefinition) -> String {
        if table.is_temporary() {
            self.quote_identifier(&format!("#{}", table.name()))
        } else {
            self.quote_identifier(table.name())
        }
    }

    fn disable_foreign_key_sql(&self) -> String {
        r#"EXEC sp_MSforeachtable "ALTER TABLE ? NOCHECK CONSTRAINT all""#.to_string()
    }

    fn enable_foreign_key_sql(&self) -> String {
        r#"EXEC sp_MSforeachtable "ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all""#.to_string()
    }

    fn begin_sql(&self) -> String {
        "BEGIN TRANSACTION".to_string()
    }

    fn commit_sql(&self) -> String {
        "COMMIT TRANSACTION".to_string()
    }

    fn rollback_sql(&self) -> String {
        "ROLLBACK TRANSACTION".to_string()
    }

    fn savepoint_sql(&self, level: u32) -> String {
        format!("SAVE TRANSACTION LEVEL{level}")
    }

    fn release_savepoint_sql(&self, _level: u32) -> Option<String> {
        None
    }

    fn rollback_savepoint_sql(&self, level: u32) -> String {
        format!("ROLLBACK TRANSACTION LEVEL{level}")
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
            vec![self.object_name(table, schema).into()],
        )
    }

    fn describe_foreign_keys_sql(&self, table: &str, schema: Option<&str>) -> MetadataQuery {
        MetadataQuery::new(
            queries::DESCRIBE_FOREIGN_KEYS,
            vec![self.object_name(table, schema).into()],
        )
    }

    fn convert_column_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "name", table)?;
        let native = required_str(row, "type", table)?;

        let mut column = map_native_type(&native, TYPES, false);
        // CHARACTER_MAXIMUM_LENGTH is -1 for the MAX types
        match (column.column_type, row.get_i64("char_length")) {
            (ColumnType::String, Some(-1)) => {
                column.column_type = ColumnType::Text;
                column.fixed = false;
            }
            (ColumnType::String | ColumnType::Binary, Some(length)) if length > 0 => {
                column.length = u32::try_from(length).ok();
            }
            _ => {}
        }
        if column.column_type == ColumnType::Decimal {
            column.length = row.get_i64("numeric_precision").and_then(|v| u32::try_from(v).ok());
            column.precision = row.get_i64("numeric_scale").and_then(|v| u32::try_from(v).ok());
        }
        column.nullable = Some(row.get_bool("is_nullable"));
        apply_default(
            &mut column,
            normalize_default(row.get_str("column_default").as_deref()),
        );
        if row.get_bool("is_identity") {
            column.auto_increment = Some(true);
        }

        table.add_column(name, column);
        Ok(())
    }

    fn convert_index_description(&self, table: &mut TableDefinition, row: &Row) -> DbResult<()> {
        let name = required_str(row, "name", table)?;
        let column = required_str(row, "column_name", table)?;
        if row.get_bool("is_primary") {
            fold_constraint(
                table,
                PRIMARY_CONSTRAINT_NAME,
                ConstraintKind::Primary,
                &column,
                None,
            )
        } else if row.get_bool("is_unique") {
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

    fn tuple_comparison_sql(&self, columns: &[String], values: &TupleValues) -> DbResult<String> {
        expression::expanded_tuple_in(columns, values, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConstraintDefinition, QueryParam};
    use serde_json::{Value as JsonValue, json};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn orders() -> TableDefinition {
        let mut table = TableDefinition::new("orders");
        table
            .add_column("id", ColumnType::BigInteger)
            .add_column(
                "code",
                ColumnDefinition::new(ColumnType::String)
                    .with_fixed(true)
                    .with_length(36),
            )
            .add_column(
                "paid",
                ColumnDefinition::new(ColumnType::Boolean)
                    .not_null()
                    .with_default(false),
            )
            .add_column("customer_id", ColumnType::Integer)
            .add_column("notes", ColumnDefinition::new(ColumnType::Text).with_comment("Free text"));
        table
            .add_constraint("primary", ConstraintDefinition::primary(&["id"]))
            .unwrap()
            .add_constraint(
                "customer_fk",
                ConstraintDefinition::foreign(&["customer_id"], &["customers", "id"]),
            )
            .unwrap();
        table
    }

    #[test]
    fn test_create_table() {
        let sql = orders().create_sql(&SqlServerDialect);
        assert_eq!(
            sql[0],
            "CREATE TABLE [orders] (\n    \
             [id] BIGINT IDENTITY(1, 1),\n    \
             [code] UNIQUEIDENTIFIER,\n    \
             [paid] BIT NOT NULL DEFAULT 0,\n    \
             [customer_id] INTEGER,\n    \
             [notes] NVARCHAR(MAX),\n    \
             PRIMARY KEY ([id]),\n    \
             CONSTRAINT [customer_fk] FOREIGN KEY ([customer_id]) REFERENCES [customers] ([id]) \
             ON UPDATE NO ACTION ON DELETE NO ACTION\n\
             )"
        );
        assert_eq!(
            sql[1],
            "EXEC sp_addextendedproperty N'MS_Description', N'Free text', N'SCHEMA', N'dbo', \
             N'TABLE', N'orders', N'COLUMN', N'notes'"
        );
    }

    #[test]
    fn test_temporary_table_uses_hash_prefix() {
        let mut table = TableDefinition::new("scratch");
        table.add_column("n", ColumnType::Integer).set_temporary(true);
        assert!(table.create_sql(&SqlServerDialect)[0].starts_with("CREATE TABLE [#scratch] ("));
        assert_eq!(table.drop_sql(&SqlServerDialect), "DROP TABLE [#scratch]");
    }

    #[test]
    fn test_transaction_statements() {
        let d = SqlServerDialect;
        assert_eq!(d.begin_sql(), "BEGIN TRANSACTION");
        assert_eq!(d.savepoint_sql(2), "SAVE TRANSACTION LEVEL2");
        assert_eq!(d.release_savepoint_sql(2), None);
        assert_eq!(d.rollback_savepoint_sql(2), "ROLLBACK TRANSACTION LEVEL2");
    }

    #[test]
    fn test_function_rewrites() {
        let d = SqlServerDialect;
        assert_eq!(d.function_sql("CONCAT", &strings(&["a", "b"])), "(a + b)");
        assert_eq!(
            d.function_sql("DATEDIFF", &strings(&["end", "start"])),
            "DATEDIFF(day, start, end)"
        );
        assert_eq!(
            d.function_sql("DATE_ADD", &strings(&["created", "3", "days"])),
            "DATEADD(day, 3, created)"
        );
        assert_eq!(
            d.function_sql("EXTRACT", &strings(&["dow", "created"])),
            "DATEPART(weekday, created)"
        );
        assert_eq!(d.function_sql("CURRENT_DATE", &[]), "CONVERT(date, GETDATE())");
    }

    #[test]
    fn test_tuple_subquery_uses_top() {
        let sql = SqlServerDialect.tuple_comparison_sql(
            &strings(&["a"]),
            &TupleValues::Subquery {
                table: "t".to_string(),
                columns: strings(&["t.x"]),
                conditions: None,
            },
        )
        .unwrap();
        assert_eq!(sql, "1 = (SELECT TOP 1 1 FROM t WHERE t.x = a)");
    }

    #[test]
    fn test_object_name_param() {
        let query = SqlServerDialect.describe_indexes_sql("orders", Some("sales"));
        assert_eq!(query.params, vec![QueryParam::from("[sales].[orders]")]);
    }

    #[test]
    fn test_convert_columns() {
        let mut table = TableDefinition::new("orders");
        let rows = [
            ("id", "int", JsonValue::Null, "NO", JsonValue::Null, 1),
            ("notes", "nvarchar", json!(-1), "YES", JsonValue::Null, 0),
            ("code", "nchar", json!(10), "YES", json!("(N'A')"), 0),
            ("total", "decimal", JsonValue::Null, "NO", json!("((0))"), 0),
        ];
        for (name, native, length, nullable, default, identity) in rows {
            let row = Row::new()
                .with("name", name)
                .with("type", native)
                .with("char_length", length)
                .with("numeric_precision", if native == "decimal" { json!(10) } else { JsonValue::Null })
                .with("numeric_scale", if native == "decimal" { json!(2) } else { JsonValue::Null })
                .with("is_nullable", nullable)
                .with("column_default", default)
                .with("is_identity", identity);
            SqlServerDialect
                .convert_column_description(&mut table, &row)
                .unwrap();
        }

        assert_eq!(table.column("id").unwrap().auto_increment, Some(true));
        assert_eq!(table.column("id").unwrap().nullable, Some(false));
        assert_eq!(table.column_type("notes"), Some(ColumnType::Text));
        let code = table.column("code").unwrap();
        assert!(code.fixed);
        assert_eq!(code.length, Some(10));
        assert_eq!(code.default, Some(json!("A")));
        let total = table.column("total").unwrap();
        assert_eq!((total.length, total.precision), (Some(10), Some(2)));
        assert_eq!(total.default, Some(json!("0")));
    }

    #[test]
    fn test_convert_foreign_key_actions() {
        let mut table = orders();
        let row = Row::new()
            .with("name", "FK_orders_customers")
            .with("column_name", "customer_id")
            .with("referenced_table", "customers")
            .with("referenced_column", "id")
            .with("on_update", "NO_ACTION")
            .with("on_delete", "SET_NULL");
        SqlServerDialect
            .convert_foreign_key_description(&mut table, &row)
            .unwrap();
        let fk = table.constraint("FK_orders_customers").unwrap();
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
        assert_eq!(fk.on_delete, ForeignKeyAction::SetNull);
    }
}
