use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use super::{or_empty, CollectContext, Collector};
use crate::error::InfoError;
use crate::snapshot::{ReplSlotEntry, ReplicationEntry, SubsetData};

const REPLICATIONS_QUERY: &str = "SELECT r.pid AS pid, \
     pg_catalog.pg_get_userbyid(r.usesysid)::text AS rolname, \
     r.application_name AS application_name, \
     r.client_addr::text AS client_addr, \
     r.client_hostname AS client_hostname, \
     r.backend_start::text AS backend_start, \
     r.state AS state \
     FROM pg_catalog.pg_stat_replication AS r";

const REPL_SLOTS_QUERY: &str = "SELECT slot_name::text AS slot_name, \
     plugin::text AS plugin, \
     slot_type AS slot_type, \
     database::text AS database, \
     active AS active \
     FROM pg_catalog.pg_replication_slots";

/// WAL senders currently streaming from this server
pub struct ReplicationsCollector;

impl Collector for ReplicationsCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct ReplicationRow {
            pid: i32,
            rolname: String,
            application_name: Option<String>,
            client_addr: Option<String>,
            client_hostname: Option<String>,
            backend_start: Option<String>,
            state: Option<String>,
        }

        if !ctx.capabilities.replication_stats_view {
            debug!("pg_stat_replication not available");
            return Ok(SubsetData::Replications(BTreeMap::new()));
        }

        let rows: Vec<ReplicationRow> = ctx.connections.fetch(REPLICATIONS_QUERY)?;
        debug!(count = ?rows.len(), "Found replication connections");

        let replications = rows
            .into_iter()
            .map(|row| {
                let entry = ReplicationEntry {
                    usename: row.rolname,
                    app_name: or_empty(row.application_name),
                    client_addr: row.client_addr,
                    client_hostname: or_empty(row.client_hostname),
                    backend_start: row.backend_start,
                    state: row.state,
                };
                (row.pid, entry)
            })
            .collect();

        Ok(SubsetData::Replications(replications))
    }
}

/// Physical and logical replication slots
pub struct ReplSlotsCollector;

impl Collector for ReplSlotsCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct SlotRow {
            slot_name: String,
            plugin: Option<String>,
            slot_type: Option<String>,
            database: Option<String>,
            active: bool,
        }

        if !ctx.capabilities.replication_slots_view {
            debug!("pg_replication_slots not available");
            return Ok(SubsetData::ReplSlots(BTreeMap::new()));
        }

        let rows: Vec<SlotRow> = ctx.connections.fetch(REPL_SLOTS_QUERY)?;
        debug!(count = ?rows.len(), "Found replication slots");

        let slots = rows
            .into_iter()
            .map(|row| {
                let entry = ReplSlotEntry {
                    plugin: row.plugin,
                    slot_type: row.slot_type,
                    database: row.database,
                    active: row.active,
                };
                (row.slot_name, entry)
            })
            .collect();

        Ok(SubsetData::ReplSlots(slots))
    }
}
