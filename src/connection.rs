//! Connection management
//!
//! Owns the single live connection of a run. The initial open is fatal on
//! failure; switching to another database is not, because the login role may
//! simply lack CONNECT on a sibling database.

use serde::de::DeserializeOwned;
use tracing::{debug, info, trace, warn};

use crate::error::InfoError;
use crate::gateway::{decode_rows, Connector, QueryGateway, Row};
use crate::input::quote_ident;

pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    active: Option<Box<dyn QueryGateway>>,
    initial: Option<String>,
    current: Option<String>,
    session_role: Option<String>,
}

impl ConnectionManager {
    /// Open the initial connection
    pub fn open(
        mut connector: Box<dyn Connector>,
        database: Option<String>,
        session_role: Option<String>,
    ) -> Result<Self, InfoError> {
        info!(database = ?database, session_role = ?session_role, "Opening connection");

        let mut gateway = connector
            .connect(database.as_deref())
            .map_err(|e| InfoError::Connection(e.to_string()))?;

        if let Some(role) = &session_role {
            let sql = set_role_statement(role);
            gateway.execute(&sql).map_err(|e| InfoError::Query {
                statement: sql.clone(),
                message: e.to_string(),
            })?;
            debug!(session_role = ?role, "Switched session role");
        }

        Ok(Self {
            connector,
            active: Some(gateway),
            initial: database.clone(),
            current: database,
            session_role,
        })
    }

    /// Close the current connection and reconnect to `database`.
    ///
    /// Returns `false` when the new connection cannot be established; the
    /// manager is then left without a live connection.
    pub fn switch(&mut self, database: &str) -> bool {
        self.close();
        debug!(database = ?database, "Switching connection");

        let mut gateway = match self.connector.connect(Some(database)) {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(database = ?database, error = ?e.to_string(), "Could not connect to database");
                return false;
            }
        };

        if let Some(role) = &self.session_role {
            if let Err(e) = gateway.execute(&set_role_statement(role)) {
                warn!(
                    database = ?database,
                    session_role = ?role,
                    error = ?e.to_string(),
                    "Could not switch session role"
                );
                return false;
            }
        }

        self.current = Some(database.to_string());
        self.active = Some(gateway);
        true
    }

    /// Make sure the live connection points at the initial database again
    pub fn restore(&mut self) -> Result<(), InfoError> {
        if self.is_connected() && self.current_database() == self.initial.as_deref() {
            return Ok(());
        }

        debug!(database = ?self.initial, "Restoring initial connection");
        self.close();

        let mut gateway = self
            .connector
            .connect(self.initial.as_deref())
            .map_err(|e| InfoError::Connection(e.to_string()))?;

        if let Some(role) = &self.session_role {
            let sql = set_role_statement(role);
            gateway.execute(&sql).map_err(|e| InfoError::Query {
                statement: sql.clone(),
                message: e.to_string(),
            })?;
        }

        self.current = self.initial.clone();
        self.active = Some(gateway);
        Ok(())
    }

    /// Database the live connection points at, if any
    pub fn current_database(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Run a query on the live connection; every failure here is fatal
    pub fn query(&mut self, sql: &str) -> Result<Vec<Row>, InfoError> {
        trace!(database = ?self.current_database(), sql = ?sql, "Running query");

        let gateway = self
            .active
            .as_mut()
            .ok_or_else(|| InfoError::Connection("no active connection".to_string()))?;
        gateway.query(sql).map_err(|e| InfoError::Query {
            statement: sql.to_string(),
            message: e.to_string(),
        })
    }

    /// Run a query and decode every row into `T`
    pub fn fetch<T: DeserializeOwned>(&mut self, sql: &str) -> Result<Vec<T>, InfoError> {
        let rows = self.query(sql)?;
        decode_rows(sql, rows)
    }

    /// Drop the live connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.active.take().is_some() {
            debug!(database = ?self.current, "Closed connection");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_role_statement(role: &str) -> String {
    format!("SET ROLE {}", quote_ident(role))
}
