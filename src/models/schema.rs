//! Backend-agnostic table model.
//!
//! A [`TableDefinition`] is the single representation shared by SQL
//! generation and introspection: dialects render it to DDL and fold catalog
//! rows back into it. All mutations validate eagerly, so a definition that
//! exists is always renderable.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};

/// Abstract column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Text,
    Uuid,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Boolean,
    Date,
    Time,
    DateTime,
    Timestamp,
    Binary,
    Json,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Integer => "integer",
            Self::BigInteger => "biginteger",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
            Self::Json => "json",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInteger)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::BigInteger | Self::Float | Self::Decimal
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::Time | Self::DateTime | Self::Timestamp
        )
    }
}

impl FromStr for ColumnType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "text" => Ok(Self::Text),
            "uuid" => Ok(Self::Uuid),
            "integer" => Ok(Self::Integer),
            "biginteger" => Ok(Self::BigInteger),
            "float" => Ok(Self::Float),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "datetime" => Ok(Self::DateTime),
            "timestamp" => Ok(Self::Timestamp),
            "binary" => Ok(Self::Binary),
            "json" => Ok(Self::Json),
            other => Err(DbError::validation(
                format!("Unknown column type '{}'", other),
                s,
            )),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of a table. Unset attributes are `None`/`false`; nothing is
/// inherited from previously added columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Decimal scale or float precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// `Some(false)` renders `NOT NULL`, `Some(true)` allows an explicit
    /// `DEFAULT NULL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// MySQL only
    #[serde(default)]
    pub unsigned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
}

impl ColumnDefinition {
    /// Create an unnamed column; the name is assigned by [`TableDefinition::add_column`].
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            name: String::new(),
            column_type,
            length: None,
            precision: None,
            nullable: None,
            default: None,
            fixed: false,
            comment: None,
            unsigned: false,
            auto_increment: None,
        }
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Shorthand for `with_nullable(false)`.
    pub fn not_null(self) -> Self {
        self.with_nullable(false)
    }

    pub fn with_default(mut self, default: impl Into<JsonValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = Some(auto_increment);
        self
    }

    /// The default value, treating an explicit JSON null as absent.
    pub fn default_value(&self) -> Option<&JsonValue> {
        self.default.as_ref().filter(|v| !v.is_null())
    }
}

impl From<ColumnType> for ColumnDefinition {
    fn from(column_type: ColumnType) -> Self {
        Self::new(column_type)
    }
}

/// Kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Index,
    Fulltext,
}

impl FromStr for IndexKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "index" => Ok(Self::Index),
            "fulltext" => Ok(Self::Fulltext),
            _ => Err(DbError::validation(format!("Unknown index kind '{}'", s), s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
    /// Prefix length per column (MySQL).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lengths: BTreeMap<String, u32>,
}

impl IndexDefinition {
    pub fn new(kind: IndexKind, columns: &[&str]) -> Self {
        Self {
            name: String::new(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            lengths: BTreeMap::new(),
        }
    }

    pub fn index(columns: &[&str]) -> Self {
        Self::new(IndexKind::Index, columns)
    }

    pub fn fulltext(columns: &[&str]) -> Self {
        Self::new(IndexKind::Fulltext, columns)
    }

    pub fn with_length(mut self, column: impl Into<String>, length: u32) -> Self {
        self.lengths.insert(column.into(), length);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    Primary,
    Unique,
    Foreign,
}

impl FromStr for ConstraintKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "unique" => Ok(Self::Unique),
            "foreign" => Ok(Self::Foreign),
            _ => Err(DbError::validation(
                format!("Unknown constraint kind '{}'", s),
                s,
            )),
        }
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ForeignKeyAction {
    Cascade,
    SetNull,
    #[default]
    Restrict,
    NoAction,
}

impl ForeignKeyAction {
    /// Parse a catalog value leniently. Accepts SQL words (`SET NULL`) and the
    /// single-letter codes PostgreSQL stores in `pg_constraint`; anything
    /// unrecognised (including `SET DEFAULT`) maps to `Restrict`.
    pub fn parse(s: &str) -> Self {
        let upper = s.trim().to_uppercase();
        match upper.as_str() {
            "CASCADE" | "C" => Self::Cascade,
            "SET NULL" | "SET_NULL" | "N" => Self::SetNull,
            "NO ACTION" | "NO_ACTION" | "A" => Self::NoAction,
            _ => Self::Restrict,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

impl FromStr for ForeignKeyAction {
    type Err = DbError;

    /// Strict parse used for user-supplied definitions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "cascade" => Ok(Self::Cascade),
            "setnull" => Ok(Self::SetNull),
            "restrict" => Ok(Self::Restrict),
            "noaction" => Ok(Self::NoAction),
            _ => Err(DbError::validation(
                format!("Unknown foreign key action '{}'", s),
                s,
            )),
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    /// Target table followed by target columns (foreign only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
}

impl ConstraintDefinition {
    pub fn new(kind: ConstraintKind, columns: &[&str]) -> Self {
        Self {
            name: String::new(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references: Vec::new(),
            on_update: ForeignKeyAction::default(),
            on_delete: ForeignKeyAction::default(),
        }
    }

    pub fn primary(columns: &[&str]) -> Self {
        Self::new(ConstraintKind::Primary, columns)
    }

    pub fn unique(columns: &[&str]) -> Self {
        Self::new(ConstraintKind::Unique, columns)
    }

    /// `references` is the target table followed by the target columns.
    pub fn foreign(columns: &[&str], references: &[&str]) -> Self {
        Self::new(ConstraintKind::Foreign, columns).with_references(references)
    }

    pub fn with_references(mut self, references: &[&str]) -> Self {
        self.references = references.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn with_on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Referenced table of a foreign constraint.
    pub fn referenced_table(&self) -> Option<&str> {
        self.references.first().map(String::as_str)
    }

    /// Referenced columns of a foreign constraint.
    pub fn referenced_columns(&self) -> &[String] {
        self.references.get(1..).unwrap_or(&[])
    }
}

/// Abstract table: ordered columns, indexes, constraints and options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    name: String,
    columns: Vec<ColumnDefinition>,
    #[serde(default)]
    indexes: Vec<IndexDefinition>,
    #[serde(default)]
    constraints: Vec<ConstraintDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, String>,
    #[serde(default)]
    temporary: bool,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a column, or replace the column of the same name in place.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        column: impl Into<ColumnDefinition>,
    ) -> &mut Self {
        let mut column = column.into();
        column.name = name.into();
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    /// Remove a column that no index or constraint refers to.
    pub fn remove_column(&mut self, name: &str) -> DbResult<&mut Self> {
        if self.column(name).is_none() {
            return Err(self.invalid(format!("Column '{}' is not defined", name)));
        }
        if let Some(index) = self
            .indexes
            .iter()
            .find(|i| i.columns.iter().any(|c| c == name))
        {
            return Err(self.invalid(format!(
                "Column '{}' is used by index '{}'",
                name, index.name
            )));
        }
        if let Some(constraint) = self
            .constraints
            .iter()
            .find(|c| c.columns.iter().any(|c| c == name))
        {
            return Err(self.invalid(format!(
                "Column '{}' is used by constraint '{}'",
                name, constraint.name
            )));
        }
        self.columns.retain(|c| c.name != name);
        Ok(self)
    }

    pub fn add_index(
        &mut self,
        name: impl Into<String>,
        mut index: IndexDefinition,
    ) -> DbResult<&mut Self> {
        index.name = name.into();
        self.check_columns(&index.name, &index.columns)?;
        if let Some(column) = index.lengths.keys().find(|c| !index.columns.contains(c)) {
            return Err(self.invalid(format!(
                "Index '{}' sets a length for column '{}' it does not cover",
                index.name, column
            )));
        }
        match self.indexes.iter_mut().find(|i| i.name == index.name) {
            Some(existing) => *existing = index,
            None => self.indexes.push(index),
        }
        Ok(self)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        mut constraint: ConstraintDefinition,
    ) -> DbResult<&mut Self> {
        constraint.name = name.into();
        self.check_columns(&constraint.name, &constraint.columns)?;

        match constraint.kind {
            ConstraintKind::Foreign => {
                if constraint.references.len() < 2 {
                    return Err(self.invalid(format!(
                        "Foreign constraint '{}' needs a referenced table and at least one column",
                        constraint.name
                    )));
                }
            }
            kind => {
                constraint.references.clear();
                constraint.on_update = ForeignKeyAction::default();
                constraint.on_delete = ForeignKeyAction::default();
                if kind == ConstraintKind::Primary {
                    if let Some(existing) = self
                        .constraints
                        .iter()
                        .find(|c| c.kind == ConstraintKind::Primary && c.name != constraint.name)
                    {
                        return Err(self.invalid(format!(
                            "Table already has primary key '{}'",
                            existing.name
                        )));
                    }
                }
            }
        }

        match self
            .constraints
            .iter_mut()
            .find(|c| c.name == constraint.name)
        {
            Some(existing) => *existing = constraint,
            None => self.constraints.push(constraint),
        }
        Ok(self)
    }

    /// Replace all table options, or clear them with `None`.
    pub fn set_options(&mut self, options: Option<BTreeMap<String, String>>) -> &mut Self {
        self.options = options.unwrap_or_default();
        self
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn set_temporary(&mut self, temporary: bool) -> &mut Self {
        self.temporary = temporary;
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Columns in DDL order.
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.column_type)
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn constraints(&self) -> &[ConstraintDefinition] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&ConstraintDefinition> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Columns of the primary constraint, if there is one.
    pub fn primary_key(&self) -> Option<&[String]> {
        self.constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::Primary)
            .map(|c| c.columns.as_slice())
    }

    /// Whether the column is generated by the database.
    ///
    /// An integer column is auto-incrementing when flagged explicitly, or when
    /// it is the sole primary key column and not explicitly opted out.
    pub fn is_serial_column(&self, column: &ColumnDefinition) -> bool {
        if !column.column_type.is_integer() {
            return false;
        }
        match column.auto_increment {
            Some(flag) => flag,
            None => self
                .primary_key()
                .is_some_and(|pk| pk.len() == 1 && pk[0] == column.name),
        }
    }

    pub fn has_autoincrement(&self) -> bool {
        self.columns.iter().any(|c| self.is_serial_column(c))
    }

    /// Statements creating this table: the `CREATE TABLE` itself, then any
    /// index and comment statements the dialect keeps out of line.
    pub fn create_sql(&self, dialect: &dyn Dialect) -> Vec<String> {
        dialect.create_table_sql(self)
    }

    pub fn drop_sql(&self, dialect: &dyn Dialect) -> String {
        dialect.drop_table_sql(self)
    }

    pub fn truncate_sql(&self, dialect: &dyn Dialect) -> String {
        dialect.truncate_table_sql(self)
    }

    fn check_columns(&self, owner: &str, columns: &[String]) -> DbResult<()> {
        if columns.is_empty() {
            return Err(self.invalid(format!("'{}' must reference at least one column", owner)));
        }
        if let Some(missing) = columns.iter().find(|c| self.column(c).is_none()) {
            return Err(self.invalid(format!(
                "'{}' references unknown column '{}'",
                owner, missing
            )));
        }
        Ok(())
    }

    fn invalid(&self, message: String) -> DbError {
        DbError::validation(message, self.name.clone())
    }
}

/// Turn a catalog default string into a typed JSON value for the column.
///
/// Integers and floats become numbers, booleans become booleans, JSON
/// columns are parsed, and everything else (decimals included, to keep
/// precision) stays a string.
pub fn parse_default_value(default_str: &str, column_type: ColumnType) -> JsonValue {
    match column_type {
        ColumnType::Integer | ColumnType::BigInteger => {
            if let Ok(n) = default_str.parse::<i64>() {
                return JsonValue::Number(n.into());
            }
        }
        ColumnType::Float => {
            if let Some(num) = default_str
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                return JsonValue::Number(num);
            }
        }
        ColumnType::Boolean => match default_str.to_lowercase().as_str() {
            "true" | "1" | "t" | "b'1'" => return JsonValue::Bool(true),
            "false" | "0" | "f" | "b'0'" => return JsonValue::Bool(false),
            _ => {}
        },
        ColumnType::Json => {
            if let Ok(parsed) = serde_json::from_str(default_str) {
                return parsed;
            }
        }
        _ => {}
    }
    JsonValue::String(default_str.to_string())
}
