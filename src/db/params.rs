//! Parameter binding for sqlx queries.
//!
//! One generic binder serves every bundled backend; the `where` clause lists
//! the encodings a backend must provide.

use crate::models::QueryParam;
use serde_json::Value as JsonValue;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Database, Encode, Type};

/// Bind `params` to `query` in order.
pub(crate) fn bind_params<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &'q [QueryParam],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Json<&'q JsonValue>: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(Json(v)),
        };
    }
    query
}
