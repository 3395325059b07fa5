use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use super::{or_empty, CollectContext, Collector};
use crate::error::InfoError;
use crate::snapshot::{SubsetData, TablespaceEntry};

const TABLESPACES_QUERY: &str = "SELECT s.spcname::text AS spcname, \
     pg_catalog.pg_get_userbyid(s.spcowner)::text AS rolname, \
     s.spcacl::text AS spcacl \
     FROM pg_catalog.pg_tablespace AS s";

const TABLESPACES_WITH_OPTIONS_QUERY: &str = "SELECT s.spcname::text AS spcname, \
     pg_catalog.pg_get_userbyid(s.spcowner)::text AS rolname, \
     s.spcacl::text AS spcacl, \
     s.spcoptions AS spcoptions \
     FROM pg_catalog.pg_tablespace AS s";

/// Tablespaces with owner, ACL and (when supported) options
pub struct TablespacesCollector;

impl Collector for TablespacesCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct TablespaceRow {
            spcname: String,
            rolname: String,
            spcacl: Option<String>,
            spcoptions: Option<Vec<String>>,
        }

        let with_options = ctx.capabilities.tablespace_options;
        let sql = if with_options {
            TABLESPACES_WITH_OPTIONS_QUERY
        } else {
            TABLESPACES_QUERY
        };

        let rows: Vec<TablespaceRow> = ctx.connections.fetch(sql)?;
        debug!(count = ?rows.len(), "Found tablespaces");

        let tablespaces = rows
            .into_iter()
            .map(|row| {
                let entry = TablespaceEntry {
                    spcowner: row.rolname,
                    spcacl: or_empty(row.spcacl),
                    spcoptions: with_options.then(|| row.spcoptions.unwrap_or_default()),
                };
                (row.spcname, entry)
            })
            .collect::<BTreeMap<_, _>>();

        Ok(SubsetData::Tablespaces(tablespaces))
    }
}
