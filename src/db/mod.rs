//! Database access layer.
//!
//! This module provides:
//! - The [`Driver`] capability and its sqlx-backed implementation
//! - Row decoding and parameter binding for sqlx
//! - [`Connection`] with nested transactions and savepoints
//! - Schema introspection through the connection's dialect
//! - An in-memory recording driver for dry runs

pub mod connection;
pub mod driver;
pub(crate) mod params;
pub mod recording;
pub mod schema;
pub mod sqlx_driver;
pub mod types;

pub use connection::Connection;
pub use driver::Driver;
pub use recording::{RecordedStatement, RecordingDriver};
pub use schema::SchemaInspector;
pub use sqlx_driver::SqlxDriver;
