use serde::Deserialize;
use tracing::debug;

use super::{or_empty, CollectContext, Collector};
use crate::error::InfoError;
use crate::snapshot::{RoleEntry, SubsetData};

const ROLES_QUERY: &str = "SELECT r.rolname::text AS rolname, r.rolsuper, r.rolcanlogin, \
     r.rolvaliduntil::text AS rolvaliduntil, \
     ARRAY(SELECT b.rolname::text \
     FROM pg_catalog.pg_auth_members AS m \
     JOIN pg_catalog.pg_roles AS b ON (m.roleid = b.oid) \
     WHERE m.member = r.oid) AS memberof \
     FROM pg_catalog.pg_roles AS r \
     WHERE r.rolname !~ '^pg_'";

/// Roles, excluding the built-in `pg_*` ones
pub struct RolesCollector;

impl Collector for RolesCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct RoleRow {
            rolname: String,
            rolsuper: bool,
            rolcanlogin: bool,
            rolvaliduntil: Option<String>,
            memberof: Option<Vec<String>>,
        }

        let rows: Vec<RoleRow> = ctx.connections.fetch(ROLES_QUERY)?;
        debug!(count = ?rows.len(), "Found roles");

        let roles = rows
            .into_iter()
            .map(|row| {
                let entry = RoleEntry {
                    superuser: row.rolsuper,
                    canlogin: row.rolcanlogin,
                    valid_until: or_empty(row.rolvaliduntil),
                    member_of: row.memberof.unwrap_or_default(),
                };
                (row.rolname, entry)
            })
            .collect();

        Ok(SubsetData::Roles(roles))
    }
}
