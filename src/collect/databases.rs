//! Database traversal
//!
//! Lists every database from the catalog, then reconnects to each one in
//! turn to read its namespaces, extensions, languages and publications.
//! A database the login role cannot connect to keeps its catalog-level
//! attributes and is marked with an error instead of aborting the run.
//! Subscriptions are server-wide, so they are read once up front and
//! handed out per database.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{or_empty, CollectContext, Collector};
use crate::capabilities::{CatalogColumn, ServerCapabilities};
use crate::connection::ConnectionManager;
use crate::decode::ExtensionVersion;
use crate::error::InfoError;
use crate::gateway::Row;
use crate::input::quote_ident;
use crate::snapshot::{
    CatalogRecord, DatabaseEntry, ExtensionEntry, LanguageEntry, NamespaceEntry, SubsetData,
};

const NAMESPACES_QUERY: &str = "SELECT n.nspname::text AS nspname, \
     pg_catalog.pg_get_userbyid(n.nspowner)::text AS rolname, \
     n.nspacl::text AS nspacl \
     FROM pg_catalog.pg_namespace AS n";

const LANGUAGES_QUERY: &str = "SELECT l.lanname::text AS lanname, \
     pg_catalog.pg_get_userbyid(l.lanowner)::text AS rolname, \
     l.lanacl::text AS lanacl \
     FROM pg_catalog.pg_language AS l";

const EXTENSIONS_QUERY: &str = "SELECT e.extname::text AS extname, \
     e.extversion::text AS extversion, \
     n.nspname::text AS nspname, \
     c.description AS description \
     FROM pg_catalog.pg_extension AS e \
     LEFT JOIN pg_catalog.pg_namespace AS n ON n.oid = e.extnamespace \
     LEFT JOIN pg_catalog.pg_description AS c ON c.objoid = e.oid \
     AND c.classoid = 'pg_catalog.pg_extension'::pg_catalog.regclass";

/// Every database except `template0`, with per-database registries
pub struct DatabasesCollector;

#[derive(Deserialize)]
struct DatabaseRow {
    datname: String,
    owner: String,
    encoding: String,
    datcollate: Option<String>,
    datctype: Option<String>,
    access_priv: Option<String>,
    size: String,
    locale_provider: Option<String>,
    icu_locale: Option<String>,
}

impl Collector for DatabasesCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        let caps = ctx.capabilities;
        let logical = caps.supports_logical_replication();

        let rows: Vec<DatabaseRow> = ctx.connections.fetch(&databases_query(caps))?;
        info!(count = ?rows.len(), "Found databases");

        let mut subscriptions = if logical {
            fetch_subscriptions(ctx.connections, caps)?
        } else {
            BTreeMap::new()
        };

        let mut databases = BTreeMap::new();
        for row in rows {
            let name = row.datname;
            let mut entry = DatabaseEntry {
                owner: row.owner,
                encoding: row.encoding,
                collate: or_empty(row.datcollate),
                ctype: or_empty(row.datctype),
                access_priv: or_empty(row.access_priv),
                size: row.size,
                locale_provider: row.locale_provider,
                icu_locale: row.icu_locale,
                namespaces: BTreeMap::new(),
                extensions: BTreeMap::new(),
                languages: BTreeMap::new(),
                publications: None,
                subscriptions: None,
                error: None,
            };

            if !ctx.connections.switch(&name) {
                warn!(database = ?name, "Skipping database, connection failed");
                entry.mark_unreachable(logical);
                databases.insert(name, entry);
                continue;
            }

            debug!(database = ?name, "Collecting database objects");
            entry.namespaces = fetch_namespaces(ctx.connections)?;
            if caps.extension_catalog {
                entry.extensions = fetch_extensions(ctx.connections)?;
            }
            entry.languages = fetch_languages(ctx.connections)?;
            if logical {
                entry.publications = Some(fetch_publications(ctx.connections, caps)?);
                entry.subscriptions = Some(subscriptions.remove(&name).unwrap_or_default());
            }

            debug!(
                database = ?name,
                namespaces = ?entry.namespaces.len(),
                extensions = ?entry.extensions.len(),
                languages = ?entry.languages.len(),
                "Database collected"
            );
            databases.insert(name, entry);
        }

        let unreachable = databases.values().filter(|d| !d.is_reachable()).count();
        if unreachable > 0 {
            warn!(unreachable = ?unreachable, total = ?databases.len(), "Some databases were not collected");
        }

        ctx.connections.restore()?;
        Ok(SubsetData::Databases(databases))
    }
}

fn databases_query(caps: &ServerCapabilities) -> String {
    let mut columns = vec![
        "d.datname::text AS datname".to_string(),
        "pg_catalog.pg_get_userbyid(d.datdba)::text AS owner".to_string(),
        "pg_catalog.pg_encoding_to_char(d.encoding)::text AS encoding".to_string(),
        "d.datcollate::text AS datcollate".to_string(),
        "d.datctype::text AS datctype".to_string(),
        "pg_catalog.array_to_string(d.datacl, E'\\n') AS access_priv".to_string(),
        "CASE WHEN pg_catalog.has_database_privilege(d.datname, 'CONNECT') \
         THEN pg_catalog.pg_database_size(d.datname)::text \
         ELSE 'No Access' END AS size"
            .to_string(),
    ];
    if caps.database_locale_provider {
        columns.push(
            "CASE d.datlocprovider WHEN 'c' THEN 'libc' WHEN 'i' THEN 'icu' \
             WHEN 'b' THEN 'builtin' END AS locale_provider"
                .to_string(),
        );
    }
    if let Some(column) = &caps.database_icu_locale {
        columns.push(format!("d.{}::text AS icu_locale", quote_ident(column)));
    }

    format!(
        "SELECT {} FROM pg_catalog.pg_database AS d \
         WHERE d.datname <> 'template0' ORDER BY d.datname",
        columns.join(", ")
    )
}

fn fetch_namespaces(
    connections: &mut ConnectionManager,
) -> Result<BTreeMap<String, NamespaceEntry>, InfoError> {
    #[derive(Deserialize)]
    struct NamespaceRow {
        nspname: String,
        rolname: String,
        nspacl: Option<String>,
    }

    let rows: Vec<NamespaceRow> = connections.fetch(NAMESPACES_QUERY)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let entry = NamespaceEntry {
                nspowner: row.rolname,
                nspacl: or_empty(row.nspacl),
            };
            (row.nspname, entry)
        })
        .collect())
}

fn fetch_languages(
    connections: &mut ConnectionManager,
) -> Result<BTreeMap<String, LanguageEntry>, InfoError> {
    #[derive(Deserialize)]
    struct LanguageRow {
        lanname: String,
        rolname: String,
        lanacl: Option<String>,
    }

    let rows: Vec<LanguageRow> = connections.fetch(LANGUAGES_QUERY)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let entry = LanguageEntry {
                lanowner: row.rolname,
                lanacl: or_empty(row.lanacl),
            };
            (row.lanname, entry)
        })
        .collect())
}

fn fetch_extensions(
    connections: &mut ConnectionManager,
) -> Result<BTreeMap<String, ExtensionEntry>, InfoError> {
    #[derive(Deserialize)]
    struct ExtensionRow {
        extname: String,
        extversion: String,
        nspname: Option<String>,
        description: Option<String>,
    }

    let rows: Vec<ExtensionRow> = connections.fetch(EXTENSIONS_QUERY)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let entry = ExtensionEntry {
                extversion: ExtensionVersion::parse(&row.extversion),
                nspname: row.nspname,
                description: row.description,
            };
            (row.extname, entry)
        })
        .collect())
}

/// Publications of the current database, with every catalog column
fn fetch_publications(
    connections: &mut ConnectionManager,
    caps: &ServerCapabilities,
) -> Result<BTreeMap<String, CatalogRecord>, InfoError> {
    if caps.publication_columns.is_empty() {
        warn!("pg_publication columns are not visible, skipping publications");
        return Ok(BTreeMap::new());
    }

    let sql = format!(
        "SELECT {}, r.rolname::text AS ownername \
         FROM pg_catalog.pg_publication AS p \
         JOIN pg_catalog.pg_roles AS r ON p.pubowner = r.oid",
        select_list("p", &caps.publication_columns)
    );

    let mut publications = BTreeMap::new();
    for mut row in connections.query(&sql)? {
        let name = take_text(&mut row, "pubname", &sql)?;
        publications.entry(name).or_insert_with(|| record(row));
    }
    Ok(publications)
}

/// All subscriptions on the server, grouped by database name
fn fetch_subscriptions(
    connections: &mut ConnectionManager,
    caps: &ServerCapabilities,
) -> Result<BTreeMap<String, BTreeMap<String, CatalogRecord>>, InfoError> {
    if caps.subscription_columns.is_empty() {
        warn!("pg_subscription columns are not visible, skipping subscriptions");
        return Ok(BTreeMap::new());
    }

    let sql = format!(
        "SELECT {}, r.rolname::text AS ownername, d.datname::text AS dbname \
         FROM pg_catalog.pg_subscription AS s \
         JOIN pg_catalog.pg_database AS d ON s.subdbid = d.oid \
         JOIN pg_catalog.pg_roles AS r ON s.subowner = r.oid",
        select_list("s", &caps.subscription_columns)
    );

    let mut by_database: BTreeMap<String, BTreeMap<String, CatalogRecord>> = BTreeMap::new();
    for mut row in connections.query(&sql)? {
        let database = take_text(&mut row, "dbname", &sql)?;
        let name = take_text(&mut row, "subname", &sql)?;
        by_database
            .entry(database)
            .or_default()
            .entry(name)
            .or_insert_with(|| record(row));
    }

    debug!(databases = ?by_database.len(), "Found subscriptions");
    Ok(by_database)
}

/// Select list for catalog columns discovered at run time. Types the
/// gateway cannot carry natively are cast to text.
fn select_list(alias: &str, columns: &[CatalogColumn]) -> String {
    columns
        .iter()
        .map(|column| {
            let ident = quote_ident(&column.column_name);
            match column.data_type.as_str() {
                "boolean" | "oid" | "smallint" | "integer" | "bigint" => {
                    format!("{}.{}", alias, ident)
                }
                "ARRAY" => format!("{}.{}::text[] AS {}", alias, ident, ident),
                _ => format!("{}.{}::text AS {}", alias, ident, ident),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Remove a text column from a dynamic row
fn take_text(row: &mut Row, column: &str, statement: &str) -> Result<String, InfoError> {
    match row.remove(column) {
        Some(Value::String(value)) => Ok(value),
        other => Err(InfoError::Decode {
            statement: statement.to_string(),
            message: format!("expected text in column '{}', got {:?}", column, other),
        }),
    }
}

fn record(row: Row) -> CatalogRecord {
    row.into_iter().collect()
}
