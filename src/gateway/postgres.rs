use postgres::types::Type;
use postgres::{Client, NoTls};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use super::{Connector, DriverError, QueryGateway, Row};
use crate::config::DbConfig;

/// Opens `postgres` client connections from a `DbConfig`
pub struct PostgresConnector {
    config: DbConfig,
}

impl PostgresConnector {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl Connector for PostgresConnector {
    fn connect(&mut self, database: Option<&str>) -> Result<Box<dyn QueryGateway>, DriverError> {
        debug!(
            host = ?self.config.host,
            port = ?self.config.port,
            database = ?database,
            "Connecting to PostgreSQL"
        );

        let conn_str = self.config.connection_string_for(database);
        let client = Client::connect(&conn_str, NoTls).map_err(|e| {
            error!(database = ?database, error = ?e, "Connection attempt failed");
            DriverError(format_postgres_error(&e))
        })?;

        Ok(Box::new(PostgresGateway::new(client)))
    }
}

/// A live `postgres` client
pub struct PostgresGateway {
    client: Client,
}

impl PostgresGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl QueryGateway for PostgresGateway {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DriverError> {
        trace!(sql = ?sql, "Executing query");

        let rows = self
            .client
            .query(sql, &[])
            .map_err(|e| DriverError(format_postgres_error(&e)))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut map = Row::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let value = column_value(row, idx, column.type_())
                    .map_err(|e| DriverError(format_postgres_error(&e)))?;
                map.insert(column.name().to_string(), value);
            }
            out.push(map);
        }

        trace!(rows = ?out.len(), "Query returned");
        Ok(out)
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        trace!(sql = ?sql, "Executing statement");

        self.client
            .batch_execute(sql)
            .map_err(|e| DriverError(format_postgres_error(&e)))
    }
}

/// Convert one column to a JSON value based on its server type
fn column_value(row: &postgres::Row, idx: usize, ty: &Type) -> Result<Value, postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::from),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(Value::from),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::from),
        Type::CHAR => row
            .try_get::<_, Option<i8>>(idx)?
            .map(|c| Value::from((c as u8 as char).to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::from)
        }
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
        _ => {
            warn!(column = ?idx, column_type = ?ty, "Unsupported column type, returning null");
            None
        }
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Formats PostgreSQL error message for display.
fn format_postgres_error(e: &postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_error) => format!("{}: {}", db_error.severity(), db_error.message()),
        None => e.to_string(),
    }
}
