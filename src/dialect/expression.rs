//! Portable function calls and tuple comparisons.
//!
//! Each dialect keeps a static table of `(NAME, rule)` pairs; a rule receives
//! the already-rendered argument list and returns the dialect's SQL.

use crate::error::{DbError, DbResult};

/// Rewrite rule for one function.
pub type FunctionRule = fn(&[String]) -> String;

/// Right-hand side of a tuple comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleValues {
    /// Rows of literals, each as wide as the column list.
    Literals(Vec<Vec<String>>),
    /// `SELECT columns FROM table [WHERE conditions]`.
    Subquery {
        table: String,
        columns: Vec<String>,
        conditions: Option<String>,
    },
}

/// `NAME(a, b, ...)`.
pub fn call(name: &str, args: &[String]) -> String {
    format!("{}({})", name, args.join(", "))
}

pub(crate) fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("NULL")
}

/// `(a <op> b <op> ...)`.
pub(crate) fn infix(args: &[String], op: &str) -> String {
    format!("({})", args.join(&format!(" {op} ")))
}

/// Split a `DATE_ADD` interval argument into amount and unit. Accepts the
/// three-argument form `(expr, amount, unit)` as well as a single
/// `'3 day'`/`INTERVAL 3 DAY` argument.
pub(crate) fn interval(args: &[String]) -> (String, String) {
    if args.len() >= 3 {
        return (
            arg(args, 1).trim().to_string(),
            arg(args, 2).trim().trim_matches('\'').to_uppercase(),
        );
    }
    let raw = arg(args, 1).trim().trim_matches('\'');
    let raw = raw
        .strip_prefix("INTERVAL ")
        .or_else(|| raw.strip_prefix("interval "))
        .unwrap_or(raw);
    let mut parts = raw.split_whitespace();
    let amount = parts.next().unwrap_or("0").trim_matches('\'').to_string();
    let unit = parts.next().unwrap_or("DAY").to_uppercase();
    (amount, unit)
}

/// Unit name without a trailing plural `S`.
pub(crate) fn singular_unit(unit: &str) -> String {
    let upper = unit.trim().trim_matches('\'').to_uppercase();
    match upper.strip_suffix('S') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => upper,
    }
}

/// `EXTRACT(UNIT FROM expr)` from the portable `EXTRACT(unit, expr)`.
pub(crate) fn extract_from(args: &[String]) -> String {
    format!("EXTRACT({} FROM {})", singular_unit(arg(args, 0)), arg(args, 1))
}

/// Reject shapes that would render invalid or silently truncated SQL.
fn check_tuple(columns: &[String], values: &TupleValues) -> DbResult<()> {
    if columns.is_empty() {
        return Err(DbError::invalid_input("tuple comparison needs at least one column"));
    }
    match values {
        TupleValues::Literals(rows) => {
            if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
                return Err(DbError::invalid_input(format!(
                    "tuple of {} values compared against {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }
        TupleValues::Subquery { columns: inner, .. } => {
            if inner.len() != columns.len() {
                return Err(DbError::invalid_input(format!(
                    "sub-select of {} columns compared against {} columns",
                    inner.len(),
                    columns.len()
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn native_tuple_in(columns: &[String], values: &TupleValues) -> DbResult<String> {
    check_tuple(columns, values)?;
    let lhs = format!("({})", columns.join(", "));
    let sql = match values {
        TupleValues::Literals(rows) if rows.is_empty() => "1 = 0".to_string(),
        TupleValues::Literals(rows) => {
            let rows: Vec<String> = rows.iter().map(|r| format!("({})", r.join(", "))).collect();
            format!("{lhs} IN ({})", rows.join(", "))
        }
        TupleValues::Subquery {
            table,
            columns: inner,
            conditions,
        } => {
            let mut sql = format!("{lhs} IN (SELECT {} FROM {table}", inner.join(", "));
            if let Some(conditions) = conditions.as_deref().filter(|c| !c.trim().is_empty()) {
                sql.push_str(&format!(" WHERE {conditions}"));
            }
            sql.push(')');
            sql
        }
    };
    Ok(sql)
}

/// Tuple comparison without row values: a disjunction of conjunctions for
/// literal lists, a correlated single-row lookup for sub-selects.
pub(crate) fn expanded_tuple_in(
    columns: &[String],
    values: &TupleValues,
    top: bool,
) -> DbResult<String> {
    check_tuple(columns, values)?;
    let sql = match values {
        TupleValues::Literals(rows) if rows.is_empty() => "1 = 0".to_string(),
        TupleValues::Literals(rows) => {
            let disjuncts: Vec<String> = rows
                .iter()
                .map(|row| {
                    let conjuncts: Vec<String> = columns
                        .iter()
                        .zip(row)
                        .map(|(c, v)| format!("{c} = {v}"))
                        .collect();
                    format!("({})", conjuncts.join(" AND "))
                })
                .collect();
            format!("({})", disjuncts.join(" OR "))
        }
        TupleValues::Subquery {
            table,
            columns: inner,
            conditions,
        } => {
            let mut filters: Vec<String> = Vec::new();
            if let Some(conditions) = conditions.as_deref().filter(|c| !c.trim().is_empty()) {
                filters.push(format!("({conditions})"));
            }
            filters.extend(
                inner
                    .iter()
                    .zip(columns)
                    .map(|(inner, outer)| format!("{inner} = {outer}")),
            );
            let select = if top { "SELECT TOP 1 1" } else { "SELECT 1" };
            let limit = if top { "" } else { " LIMIT 1" };
            format!(
                "1 = ({select} FROM {table} WHERE {}{limit})",
                filters.join(" AND ")
            )
        }
    };
    Ok(sql)
}
