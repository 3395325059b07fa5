//! Subset collectors
//!
//! One collector per catalog subset. Each runs its queries through the
//! context's connection, decodes rows into typed structs and returns the
//! finished sub-tree. Adding a subset means adding a collector and a
//! `collector_for` arm; orchestration does not change.

use crate::capabilities::ServerCapabilities;
use crate::catalog::Subset;
use crate::connection::ConnectionManager;
use crate::error::InfoError;
use crate::snapshot::SubsetData;

mod databases;
mod replication;
mod roles;
mod server;
mod settings;
mod tablespaces;

pub use databases::DatabasesCollector;
pub use replication::{ReplSlotsCollector, ReplicationsCollector};
pub use roles::RolesCollector;
pub use server::{InRecoveryCollector, VersionCollector};
pub use settings::SettingsCollector;
pub use tablespaces::TablespacesCollector;

/// State threaded through every collector of a run
pub struct CollectContext<'a> {
    pub connections: &'a mut ConnectionManager,
    pub capabilities: &'a ServerCapabilities,
}

/// Gathers one subset
pub trait Collector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError>;
}

/// The collector responsible for `subset`
pub fn collector_for(subset: Subset) -> &'static dyn Collector {
    match subset {
        Subset::Version => &VersionCollector,
        Subset::InRecovery => &InRecoveryCollector,
        Subset::Tablespaces => &TablespacesCollector,
        Subset::Databases => &DatabasesCollector,
        Subset::Replications => &ReplicationsCollector,
        Subset::ReplSlots => &ReplSlotsCollector,
        Subset::Settings => &SettingsCollector,
        Subset::Roles => &RolesCollector,
    }
}

/// Null text columns are reported as empty strings
fn or_empty(value: Option<String>) -> String {
    value.unwrap_or_default()
}
