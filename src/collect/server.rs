use serde::Deserialize;
use tracing::debug;

use super::{CollectContext, Collector};
use crate::decode::ServerVersion;
use crate::error::InfoError;
use crate::snapshot::SubsetData;

const VERSION_QUERY: &str = "SELECT pg_catalog.version() AS version";

const RECOVERY_QUERY: &str = "SELECT pg_catalog.pg_is_in_recovery() AS in_recovery";

/// Server version, decoded from `server_version_num`
pub struct VersionCollector;

impl Collector for VersionCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct VersionRow {
            version: String,
        }

        let rows: Vec<VersionRow> = ctx.connections.fetch(VERSION_QUERY)?;
        let raw = single(rows, VERSION_QUERY)?.version;

        let version = ServerVersion::from_num(ctx.capabilities.server_version_num, raw);
        debug!(version = ?version.full, "Found server version");
        Ok(SubsetData::Version(version))
    }
}

/// Whether the server is a standby in recovery
pub struct InRecoveryCollector;

impl Collector for InRecoveryCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct RecoveryRow {
            in_recovery: bool,
        }

        let rows: Vec<RecoveryRow> = ctx.connections.fetch(RECOVERY_QUERY)?;
        let in_recovery = single(rows, RECOVERY_QUERY)?.in_recovery;

        debug!(in_recovery = ?in_recovery, "Found recovery state");
        Ok(SubsetData::InRecovery(in_recovery))
    }
}

/// The only row of a single-row query
fn single<T>(rows: Vec<T>, statement: &str) -> Result<T, InfoError> {
    rows.into_iter().next().ok_or_else(|| InfoError::Decode {
        statement: statement.to_string(),
        message: "query returned no rows".to_string(),
    })
}
