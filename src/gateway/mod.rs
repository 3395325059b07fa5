//! Query gateway
//!
//! The boundary between the collector and a database driver. A driver opens
//! connections (`Connector`) and runs plain SQL on them (`QueryGateway`),
//! handing rows back as column-name keyed maps. Collectors decode those maps
//! into typed row structs before touching any values.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::InfoError;

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

/// Failure reported by the driver, carried as its message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DriverError(pub String);

/// An open connection that can run SQL
pub trait QueryGateway {
    /// Run a statement and return every row it produced
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DriverError>;

    /// Run a statement that returns no rows
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;
}

/// Opens connections to a server, one database at a time
pub trait Connector {
    /// Connect to `database`, or to the driver's default database when `None`
    fn connect(&mut self, database: Option<&str>) -> Result<Box<dyn QueryGateway>, DriverError>;
}

/// Decode rows into `T`, naming `statement` on failure
pub fn decode_rows<T: DeserializeOwned>(statement: &str, rows: Vec<Row>) -> Result<Vec<T>, InfoError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|e| InfoError::Decode {
                statement: statement.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use self::postgres::{PostgresConnector, PostgresGateway};
