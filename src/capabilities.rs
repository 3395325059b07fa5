//! Server capability probing
//!
//! Columns and views appear and disappear across server releases. They are
//! looked up once per run through `information_schema`, and collectors
//! consult the resulting `ServerCapabilities` instead of querying blind.

use serde::Deserialize;
use tracing::{debug, info};

use crate::connection::ConnectionManager;
use crate::error::InfoError;

/// First `server_version_num` with publications and subscriptions
pub const LOGICAL_REPLICATION_VERSION: u32 = 100000;

const VERSION_QUERY: &str =
    "SELECT pg_catalog.current_setting('server_version_num') AS server_version_num";

const COLUMNS_QUERY: &str = "SELECT table_name::text AS table_name, \
     column_name::text AS column_name, \
     data_type::text AS data_type \
     FROM information_schema.columns \
     WHERE table_schema = 'pg_catalog' \
     AND table_name IN ('pg_settings', 'pg_tablespace', 'pg_database', \
     'pg_publication', 'pg_subscription') \
     ORDER BY table_name, ordinal_position";

const RELATIONS_QUERY: &str = "SELECT table_name::text AS table_name \
     FROM information_schema.tables \
     WHERE table_name IN ('pg_extension', 'pg_replication_slots', 'pg_stat_replication')";

/// A column of a system catalog, as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

#[derive(Deserialize)]
struct VersionRow {
    server_version_num: String,
}

#[derive(Deserialize)]
struct RelationRow {
    table_name: String,
}

/// What the connected server supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub server_version_num: u32,
    /// `pg_settings.pending_restart`
    pub settings_pending_restart: bool,
    /// `pg_tablespace.spcoptions`
    pub tablespace_options: bool,
    /// `pg_database.datlocprovider`
    pub database_locale_provider: bool,
    /// `pg_database.datlocale` or the older `daticulocale`
    pub database_icu_locale: Option<String>,
    pub extension_catalog: bool,
    pub replication_slots_view: bool,
    pub replication_stats_view: bool,
    pub publication_columns: Vec<CatalogColumn>,
    pub subscription_columns: Vec<CatalogColumn>,
}

impl ServerCapabilities {
    /// Probe the server on the current connection
    pub fn probe(connections: &mut ConnectionManager) -> Result<Self, InfoError> {
        debug!("Probing server capabilities");

        let version: Vec<VersionRow> = connections.fetch(VERSION_QUERY)?;
        let raw = version
            .first()
            .map(|row| row.server_version_num.as_str())
            .unwrap_or_default();
        let server_version_num = raw.trim().parse::<u32>().map_err(|e| InfoError::Decode {
            statement: VERSION_QUERY.to_string(),
            message: format!("invalid server_version_num '{}': {}", raw, e),
        })?;

        let columns: Vec<CatalogColumn> = connections.fetch(COLUMNS_QUERY)?;
        let relations: Vec<RelationRow> = connections.fetch(RELATIONS_QUERY)?;
        let relations: Vec<String> = relations.into_iter().map(|r| r.table_name).collect();

        let capabilities = Self::from_catalog(server_version_num, columns, &relations);
        info!(
            server_version_num = ?capabilities.server_version_num,
            pending_restart = ?capabilities.settings_pending_restart,
            tablespace_options = ?capabilities.tablespace_options,
            extensions = ?capabilities.extension_catalog,
            replication_slots = ?capabilities.replication_slots_view,
            "Server capabilities probed"
        );
        Ok(capabilities)
    }

    /// Build capabilities from already fetched catalog metadata
    pub fn from_catalog(
        server_version_num: u32,
        columns: Vec<CatalogColumn>,
        relations: &[String],
    ) -> Self {
        let has_column = |table: &str, column: &str| {
            columns
                .iter()
                .any(|c| c.table_name == table && c.column_name == column)
        };
        let has_relation = |name: &str| relations.iter().any(|r| r == name);

        let database_icu_locale = ["datlocale", "daticulocale"]
            .into_iter()
            .find(|column| has_column("pg_database", column))
            .map(str::to_string);

        let mut capabilities = Self {
            server_version_num,
            settings_pending_restart: has_column("pg_settings", "pending_restart"),
            tablespace_options: has_column("pg_tablespace", "spcoptions"),
            database_locale_provider: has_column("pg_database", "datlocprovider"),
            database_icu_locale,
            extension_catalog: has_relation("pg_extension"),
            replication_slots_view: has_relation("pg_replication_slots"),
            replication_stats_view: has_relation("pg_stat_replication"),
            publication_columns: Vec::new(),
            subscription_columns: Vec::new(),
        };

        for column in columns {
            match column.table_name.as_str() {
                "pg_publication" => capabilities.publication_columns.push(column),
                "pg_subscription" => capabilities.subscription_columns.push(column),
                _ => {}
            }
        }

        capabilities
    }

    /// Publications and subscriptions exist on this server
    pub fn supports_logical_replication(&self) -> bool {
        self.server_version_num >= LOGICAL_REPLICATION_VERSION
    }
}
