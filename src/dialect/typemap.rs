//! Reverse type mapping: native type strings and catalog defaults back into
//! abstract column attributes.

use crate::models::{ColumnDefinition, ColumnType, parse_default_value};

/// A native type string split into its parts.
///
/// `timestamp(6) with time zone` parses to base `timestamp with time zone`
/// with length 6; `int(11) unsigned` to base `int`, length 11, unsigned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeType {
    pub base: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub unsigned: bool,
}

pub fn parse_native_type(native: &str) -> NativeType {
    let lower = native.trim().to_lowercase();
    let (raw_base, args) = match (lower.find('('), lower.rfind(')')) {
        (Some(open), Some(close)) if close > open => (
            format!("{} {}", &lower[..open], &lower[close + 1..]),
            Some(lower[open + 1..close].to_string()),
        ),
        _ => (lower.clone(), None),
    };

    let mut unsigned = false;
    let base = raw_base
        .split_whitespace()
        .filter(|w| match *w {
            "unsigned" => {
                unsigned = true;
                false
            }
            "signed" | "zerofill" => false,
            _ => true,
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut numbers = args
        .iter()
        .flat_map(|a| a.split(','))
        .map(|part| part.trim().parse::<u32>().ok());
    let length = numbers.next().flatten();
    let precision = numbers.next().flatten();

    NativeType {
        base,
        length,
        precision,
        unsigned,
    }
}

/// One entry of a dialect's native type table.
#[derive(Debug, Clone, Copy)]
pub struct TypeRule {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub fixed: bool,
    /// Length implied by the type name itself (`tinytext` is 255 long).
    pub implied_length: Option<u32>,
}

impl TypeRule {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            fixed: false,
            implied_length: None,
        }
    }

    pub const fn fixed(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            fixed: true,
            implied_length: None,
        }
    }

    pub const fn sized(name: &'static str, column_type: ColumnType, length: u32) -> Self {
        Self {
            name,
            column_type,
            fixed: false,
            implied_length: Some(length),
        }
    }
}

/// Map a native type string through `rules`. Unknown names become strings
/// when they mention `char` and text otherwise. `uuid_from_char36` turns
/// `char(36)` into uuid on products without a native uuid type.
pub fn map_native_type(
    native: &str,
    rules: &[TypeRule],
    uuid_from_char36: bool,
) -> ColumnDefinition {
    let parsed = parse_native_type(native);
    let rule = rules.iter().find(|r| r.name == parsed.base).copied();
    let (column_type, fixed, implied_length) = match rule {
        Some(rule) => (rule.column_type, rule.fixed, rule.implied_length),
        None if parsed.base.contains("char") => (ColumnType::String, false, None),
        None => (ColumnType::Text, false, None),
    };

    let mut column = ColumnDefinition::new(column_type);
    column.unsigned = parsed.unsigned;
    match column_type {
        ColumnType::String | ColumnType::Binary => {
            column.length = parsed.length.or(implied_length);
            column.fixed = fixed;
        }
        ColumnType::Text => column.length = implied_length,
        ColumnType::Decimal => {
            column.length = parsed.length;
            column.precision = parsed.precision;
        }
        ColumnType::Float => column.precision = parsed.length,
        // display widths and fractional seconds carry no model information
        _ => {}
    }

    if uuid_from_char36
        && column.column_type == ColumnType::String
        && column.fixed
        && column.length == Some(36)
    {
        column.column_type = ColumnType::Uuid;
        column.fixed = false;
        column.length = None;
    }
    column
}

/// A catalog default after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeDefault {
    None,
    /// Sequence-backed default (`nextval(...)`).
    AutoIncrement,
    Value(String),
}

/// Strip wrapping parentheses, casts and quotes from a catalog default.
pub fn normalize_default(raw: Option<&str>) -> NativeDefault {
    let Some(raw) = raw else {
        return NativeDefault::None;
    };
    let mut value = raw.trim();
    if value.to_lowercase().starts_with("nextval(") {
        return NativeDefault::AutoIncrement;
    }

    loop {
        let stripped = strip_wrapping_parens(value);
        let stripped = strip_cast(stripped);
        if stripped == value {
            break;
        }
        value = stripped;
    }

    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return NativeDefault::None;
    }
    if let Some(inner) = unquote(value) {
        return NativeDefault::Value(inner);
    }
    NativeDefault::Value(value.to_string())
}

/// Apply a normalised default to a column.
pub fn apply_default(column: &mut ColumnDefinition, default: NativeDefault) {
    match default {
        NativeDefault::None => {}
        NativeDefault::AutoIncrement => column.auto_increment = Some(true),
        NativeDefault::Value(value) => {
            column.default = Some(parse_default_value(&value, column.column_type));
        }
    }
}

fn strip_wrapping_parens(value: &str) -> &str {
    let trimmed = value.trim();
    if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
        return trimmed;
    }
    // only strip when the first parenthesis closes at the very end
    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, ch) in trimmed.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 && i != trimmed.len() - 1 {
                    return trimmed;
                }
            }
            _ => {}
        }
    }
    trimmed[1..trimmed.len() - 1].trim()
}

fn strip_cast(value: &str) -> &str {
    match value.rfind("::") {
        Some(pos) if !value[pos..].contains('\'') && !value[pos..].contains(')') => {
            value[..pos].trim()
        }
        _ => value,
    }
}

fn unquote(value: &str) -> Option<String> {
    let inner = value
        .strip_prefix("N'")
        .or_else(|| value.strip_prefix('\''))?
        .strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &[TypeRule] = &[
        TypeRule::new("varchar", ColumnType::String),
        TypeRule::fixed("char", ColumnType::String),
        TypeRule::new("int", ColumnType::Integer),
        TypeRule::new("decimal", ColumnType::Decimal),
        TypeRule::new("timestamp with time zone", ColumnType::Timestamp),
        TypeRule::sized("tinytext", ColumnType::Text, 255),
    ];

    #[test]
    fn test_parse_native_type() {
        assert_eq!(
            parse_native_type("timestamp(6) with time zone"),
            NativeType {
                base: "timestamp with time zone".to_string(),
                length: Some(6),
                precision: None,
                unsigned: false,
            }
        );
        assert_eq!(
            parse_native_type("INT(11) UNSIGNED ZEROFILL"),
            NativeType {
                base: "int".to_string(),
                length: Some(11),
                precision: None,
                unsigned: true,
            }
        );
        let decimal = parse_native_type("numeric(10, 2)");
        assert_eq!(decimal.length, Some(10));
        assert_eq!(decimal.precision, Some(2));
    }

    #[test]
    fn test_map_native_type() {
        let col = map_native_type("varchar(25)", RULES, false);
        assert_eq!(col.column_type, ColumnType::String);
        assert_eq!(col.length, Some(25));

        let col = map_native_type("int(11) unsigned", RULES, false);
        assert_eq!(col.column_type, ColumnType::Integer);
        assert_eq!(col.length, None);
        assert!(col.unsigned);

        let col = map_native_type("decimal(8,3)", RULES, false);
        assert_eq!((col.length, col.precision), (Some(8), Some(3)));

        let col = map_native_type("tinytext", RULES, false);
        assert_eq!(col.column_type, ColumnType::Text);
        assert_eq!(col.length, Some(255));
    }

    #[test]
    fn test_map_char36_to_uuid() {
        assert_eq!(
            map_native_type("char(36)", RULES, true).column_type,
            ColumnType::Uuid
        );
        let col = map_native_type("char(36)", RULES, false);
        assert_eq!(col.column_type, ColumnType::String);
        assert!(col.fixed);
    }

    #[test]
    fn test_map_unknown_types() {
        assert_eq!(
            map_native_type("nvarchar2(10)", RULES, false).column_type,
            ColumnType::String
        );
        assert_eq!(
            map_native_type("geometry", RULES, false).column_type,
            ColumnType::Text
        );
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default(None), NativeDefault::None);
        assert_eq!(normalize_default(Some("NULL")), NativeDefault::None);
        assert_eq!(
            normalize_default(Some("nextval('articles_id_seq'::regclass)")),
            NativeDefault::AutoIncrement
        );
        assert_eq!(
            normalize_default(Some("'draft'::character varying")),
            NativeDefault::Value("draft".to_string())
        );
        assert_eq!(
            normalize_default(Some("((0))")),
            NativeDefault::Value("0".to_string())
        );
        assert_eq!(
            normalize_default(Some("(N'it''s')")),
            NativeDefault::Value("it's".to_string())
        );
        assert_eq!(
            normalize_default(Some("NULL::character varying")),
            NativeDefault::None
        );
        assert_eq!(
            normalize_default(Some("CURRENT_TIMESTAMP")),
            NativeDefault::Value("CURRENT_TIMESTAMP".to_string())
        );
        assert_eq!(
            normalize_default(Some("(1) + (2)")),
            NativeDefault::Value("(1) + (2)".to_string())
        );
    }
}
